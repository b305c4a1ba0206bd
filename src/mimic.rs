//! Mimic joint dependencies.
//!
//! A mimic joint follows a driving joint: its value is always
//! `driver * multiplier + offset`. The dependency graph is an adjacency list
//! from each driver to the joints that mimic it, built once when the robot
//! is compiled and rejected if it contains a cycle.

use crate::joint::{Joint, JointCommand};
use crate::robot::JointId;
use crate::scene::SceneGraph;

/// The relation of a mimic joint to its driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mimic {
    /// The driving joint.
    pub driver: JointId,
    /// Scale applied to the driver's value.
    pub multiplier: f64,
    /// Offset added after scaling.
    pub offset: f64,
}

impl Mimic {
    /// Value of the mimic joint for a given driver value.
    #[must_use]
    pub fn apply(&self, driver_value: f64) -> f64 {
        driver_value * self.multiplier + self.offset
    }
}

/// Driver to dependents adjacency over joint ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimicGraph {
    dependents: Vec<Vec<JointId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl MimicGraph {
    /// Build the graph from each joint's optional mimic relation, indexed by
    /// joint id.
    #[must_use]
    pub fn from_mimics(mimics: &[Option<Mimic>]) -> Self {
        let mut dependents = vec![Vec::new(); mimics.len()];
        for (id, mimic) in mimics.iter().enumerate() {
            if let Some(m) = mimic {
                if let Some(list) = dependents.get_mut(m.driver.0) {
                    list.push(JointId(id));
                }
            }
        }
        Self { dependents }
    }

    /// Joints that directly mimic `driver`.
    #[must_use]
    pub fn dependents(&self, driver: JointId) -> &[JointId] {
        self.dependents.get(driver.0).map_or(&[], Vec::as_slice)
    }

    /// Find a dependency cycle, returned as the joint ids along it with the
    /// first joint repeated at the end.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<JointId>> {
        let mut marks = vec![Mark::Unvisited; self.dependents.len()];
        let mut path = Vec::new();

        fn visit(
            id: JointId,
            graph: &MimicGraph,
            marks: &mut [Mark],
            path: &mut Vec<JointId>,
        ) -> Option<Vec<JointId>> {
            match marks[id.0] {
                Mark::Done => return None,
                Mark::Visiting => {
                    let start = path.iter().position(|&p| p == id).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(id);
                    return Some(cycle);
                }
                Mark::Unvisited => {}
            }

            marks[id.0] = Mark::Visiting;
            path.push(id);
            for &dep in graph.dependents(id) {
                if let Some(cycle) = visit(dep, graph, marks, path) {
                    return Some(cycle);
                }
            }
            path.pop();
            marks[id.0] = Mark::Done;
            None
        }

        (0..self.dependents.len()).find_map(|i| visit(JointId(i), self, &mut marks, &mut path))
    }
}

/// Apply `command` to joint `id` and propagate it to every joint that
/// mimics it, transitively.
///
/// Dependents are always updated, even when `id` itself does not change.
/// Returns whether any joint in the fan-out changed.
pub(crate) fn drive(
    joints: &mut [Joint],
    scene: &mut SceneGraph,
    graph: &MimicGraph,
    id: JointId,
    command: &JointCommand,
) -> bool {
    let mut changed = false;

    for &dep in graph.dependents(id) {
        let Some(mimic) = joints[dep.0].mimic() else {
            continue;
        };
        let derived = command.map(|v| mimic.apply(v));
        changed |= drive(joints, scene, graph, dep, &derived);
    }

    let joint = &mut joints[id.0];
    match scene.node_mut(joint.node()) {
        Some(node) => changed |= joint.set_value(command, &mut node.transform),
        None => tracing::warn!("Joint '{}' has no scene node", joint.name()),
    }

    changed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn mimic(driver: usize) -> Option<Mimic> {
        Some(Mimic {
            driver: JointId(driver),
            multiplier: 1.0,
            offset: 0.0,
        })
    }

    #[test]
    fn test_apply() {
        let m = Mimic {
            driver: JointId(0),
            multiplier: 2.0,
            offset: 5.0,
        };
        assert_eq!(m.apply(10.0), 25.0);
    }

    #[test]
    fn test_dependents_chain() {
        // 0 <- 1 <- 2, and 0 <- 3
        let graph = MimicGraph::from_mimics(&[None, mimic(0), mimic(1), mimic(0)]);
        assert_eq!(graph.dependents(JointId(0)), &[JointId(1), JointId(3)]);
        assert_eq!(graph.dependents(JointId(1)), &[JointId(2)]);
        assert_eq!(graph.dependents(JointId(2)), &[] as &[JointId]);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // 1 and 2 both follow 0; 3 follows 1. No cycle even though 0 fans out.
        let graph = MimicGraph::from_mimics(&[None, mimic(0), mimic(0), mimic(1)]);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_two_cycle() {
        let graph = MimicGraph::from_mimics(&[mimic(1), mimic(0)]);
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_self_mimic_is_cycle() {
        let graph = MimicGraph::from_mimics(&[None, mimic(1)]);
        assert_eq!(graph.find_cycle().unwrap(), vec![JointId(1), JointId(1)]);
    }

    #[test]
    fn test_longer_cycle_behind_chain() {
        // 0 drives 1, 1 -> 2 -> 3 -> 1
        let graph = MimicGraph::from_mimics(&[None, mimic(3), mimic(1), mimic(2)]);
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.len(), 4);
        assert!(!cycle.contains(&JointId(0)));
    }
}
