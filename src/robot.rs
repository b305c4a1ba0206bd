//! The live robot: links, joints, geometry carriers, and their scene graph.
//!
//! A [`Robot`] owns every object it is built from. Links, joints, visuals,
//! and collisions live in flat vectors addressed by typed ids, and each one
//! points at the scene node that carries its transform. Name lookups go
//! through per-kind maps plus a merged frame map.
//!
//! Cloning a robot copies the arena as a whole, so mimic relations and node
//! references in the copy point at the copy's own joints and nodes.

use std::collections::HashMap;

use nalgebra::Matrix4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::{MeshResponse, mesh_transform};
use crate::joint::{Joint, JointCommand, JointType};
use crate::material::{Material, MaterialRegistry};
use crate::mimic::{self, MimicGraph};
use crate::scene::{NodeId, NodeKind, SceneGraph, SceneNode};
use crate::types::{UrdfGeometry, UrdfInertial, UrdfOrigin};

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub usize);
    };
}

index_type!(
    /// Index of a link within its robot.
    LinkId
);
index_type!(
    /// Index of a joint within its robot.
    JointId
);
index_type!(
    /// Index of a visual within its robot.
    VisualId
);
index_type!(
    /// Index of a collision within its robot.
    CollisionId
);

// ============================================================================
// Components
// ============================================================================

/// A rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub(crate) name: String,
    pub(crate) inertial: Option<UrdfInertial>,
    pub(crate) visuals: Vec<VisualId>,
    pub(crate) collisions: Vec<CollisionId>,
    pub(crate) parent_joint: Option<JointId>,
    pub(crate) child_joints: Vec<JointId>,
    pub(crate) node: NodeId,
}

impl Link {
    /// Link name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inertial properties, carried through from the description.
    #[must_use]
    pub fn inertial(&self) -> Option<&UrdfInertial> {
        self.inertial.as_ref()
    }

    /// Visuals attached to this link.
    #[must_use]
    pub fn visuals(&self) -> &[VisualId] {
        &self.visuals
    }

    /// Collisions attached to this link.
    #[must_use]
    pub fn collisions(&self) -> &[CollisionId] {
        &self.collisions
    }

    /// The joint this link hangs from. `None` for root links.
    #[must_use]
    pub fn parent_joint(&self) -> Option<JointId> {
        self.parent_joint
    }

    /// Joints for which this link is the parent.
    #[must_use]
    pub fn child_joints(&self) -> &[JointId] {
        &self.child_joints
    }

    /// Scene node of the link frame.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// A visual geometry carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    pub(crate) name: Option<String>,
    pub(crate) link: LinkId,
    pub(crate) origin: UrdfOrigin,
    pub(crate) geometry: Option<UrdfGeometry>,
    pub(crate) material: Material,
    pub(crate) node: NodeId,
}

impl Visual {
    /// Optional name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning link.
    #[must_use]
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Origin relative to the link.
    #[must_use]
    pub fn origin(&self) -> &UrdfOrigin {
        &self.origin
    }

    /// Parsed geometry.
    #[must_use]
    pub fn geometry(&self) -> Option<&UrdfGeometry> {
        self.geometry.as_ref()
    }

    /// Resolved material.
    #[must_use]
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Scene node carrying the geometry.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// A collision geometry carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub(crate) name: Option<String>,
    pub(crate) link: LinkId,
    pub(crate) origin: UrdfOrigin,
    pub(crate) geometry: Option<UrdfGeometry>,
    pub(crate) node: NodeId,
}

impl Collision {
    /// Optional name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning link.
    #[must_use]
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Origin relative to the link.
    #[must_use]
    pub fn origin(&self) -> &UrdfOrigin {
        &self.origin
    }

    /// Parsed geometry.
    #[must_use]
    pub fn geometry(&self) -> Option<&UrdfGeometry> {
        self.geometry.as_ref()
    }

    /// Scene node carrying the geometry.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Any named frame of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    /// A link frame.
    Link(LinkId),
    /// A joint frame.
    Joint(JointId),
    /// A named visual.
    Visual(VisualId),
    /// A named collision.
    Collision(CollisionId),
}

// ============================================================================
// Pending meshes
// ============================================================================

/// Where a requested mesh stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    /// Requested, no completion yet.
    Pending,
    /// Loaded and attached to its carrier.
    Attached(NodeId),
    /// The loader reported an error.
    Failed,
}

/// A mesh requested from the loader for one visual or collision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMesh {
    pub(crate) path: String,
    pub(crate) carrier: NodeId,
    pub(crate) origin: UrdfOrigin,
    pub(crate) scale: nalgebra::Vector3<f64>,
    pub(crate) material: Option<Material>,
    pub(crate) state: MeshState,
}

impl PendingMesh {
    /// Resolved path that was requested.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Visual or collision node the mesh attaches under.
    #[must_use]
    pub fn carrier(&self) -> NodeId {
        self.carrier
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MeshState {
        self.state
    }
}

// ============================================================================
// Robot
// ============================================================================

/// A compiled robot.
///
/// A clone shares the original's load generation and mesh slots. While
/// meshes are still pending, each completion is attached to whichever copy
/// is passed to [`UrdfLoader::attach_loaded_meshes`] first and stays pending
/// in the other. Clone after [`Robot::pending_mesh_count`] reaches zero to
/// get two complete copies.
///
/// [`UrdfLoader::attach_loaded_meshes`]: crate::UrdfLoader::attach_loaded_meshes
#[derive(Debug, Clone)]
pub struct Robot {
    pub(crate) name: String,
    pub(crate) scene: SceneGraph,
    pub(crate) root: NodeId,
    pub(crate) links: Vec<Link>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) visuals: Vec<Visual>,
    pub(crate) collisions: Vec<Collision>,
    pub(crate) link_map: HashMap<String, LinkId>,
    pub(crate) joint_map: HashMap<String, JointId>,
    pub(crate) visual_map: HashMap<String, VisualId>,
    pub(crate) collision_map: HashMap<String, CollisionId>,
    pub(crate) frames: HashMap<String, Frame>,
    pub(crate) mimic_graph: MimicGraph,
    pub(crate) materials: MaterialRegistry,
    pub(crate) meshes: Vec<PendingMesh>,
    pub(crate) generation: u64,
}

impl Robot {
    /// Robot name. Empty when the document did not name it.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scene graph.
    #[must_use]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    /// The robot's root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Load generation this robot was built in.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Named top-level materials.
    #[must_use]
    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// Mimic dependency graph.
    #[must_use]
    pub fn mimic_graph(&self) -> &MimicGraph {
        &self.mimic_graph
    }

    /// All links, indexed by [`LinkId`].
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// All joints, indexed by [`JointId`].
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// All visuals, indexed by [`VisualId`].
    #[must_use]
    pub fn visuals(&self) -> &[Visual] {
        &self.visuals
    }

    /// All collisions, indexed by [`CollisionId`].
    #[must_use]
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Meshes requested from the loader.
    #[must_use]
    pub fn meshes(&self) -> &[PendingMesh] {
        &self.meshes
    }

    /// Number of mesh requests that have not completed.
    #[must_use]
    pub fn pending_mesh_count(&self) -> usize {
        self.meshes
            .iter()
            .filter(|m| m.state == MeshState::Pending)
            .count()
    }

    /// Link name to id.
    #[must_use]
    pub fn link_map(&self) -> &HashMap<String, LinkId> {
        &self.link_map
    }

    /// Joint name to id.
    #[must_use]
    pub fn joint_map(&self) -> &HashMap<String, JointId> {
        &self.joint_map
    }

    /// Named visuals.
    #[must_use]
    pub fn visual_map(&self) -> &HashMap<String, VisualId> {
        &self.visual_map
    }

    /// Named collisions.
    #[must_use]
    pub fn collision_map(&self) -> &HashMap<String, CollisionId> {
        &self.collision_map
    }

    /// All named frames. On a name clash joints win over links, links over
    /// visuals, and visuals over collisions.
    #[must_use]
    pub fn frames(&self) -> &HashMap<String, Frame> {
        &self.frames
    }

    /// Link by name.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&Link> {
        self.link_map.get(name).map(|id| &self.links[id.0])
    }

    /// Joint by name.
    #[must_use]
    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joint_map.get(name).map(|id| &self.joints[id.0])
    }

    /// Mutable joint by name, for changing limits or the ignore-limits flag.
    pub fn joint_mut(&mut self, name: &str) -> Option<&mut Joint> {
        let id = *self.joint_map.get(name)?;
        self.joints.get_mut(id.0)
    }

    /// Change a joint's type.
    ///
    /// The value resets to the new type's zeros and the joint node returns to
    /// its captured origin pose. Returns whether the type changed; `false`
    /// for an unknown joint name.
    pub fn set_joint_type(&mut self, name: &str, joint_type: JointType) -> bool {
        let Some(&id) = self.joint_map.get(name) else {
            return false;
        };
        let joint = &mut self.joints[id.0];
        match self.scene.node_mut(joint.node()) {
            Some(node) => joint.set_joint_type(joint_type, &mut node.transform),
            None => {
                tracing::warn!("Joint '{}' has no scene node", joint.name());
                false
            }
        }
    }

    /// Visual by name.
    #[must_use]
    pub fn visual(&self, name: &str) -> Option<&Visual> {
        self.visual_map.get(name).map(|id| &self.visuals[id.0])
    }

    /// Collision by name.
    #[must_use]
    pub fn collision(&self, name: &str) -> Option<&Collision> {
        self.collision_map.get(name).map(|id| &self.collisions[id.0])
    }

    /// Look up any named frame.
    #[must_use]
    pub fn frame(&self, name: &str) -> Option<Frame> {
        self.frames.get(name).copied()
    }

    /// Scene node of a frame. `None` if the id is out of range for this
    /// robot.
    #[must_use]
    pub fn frame_node_id(&self, frame: Frame) -> Option<NodeId> {
        match frame {
            Frame::Link(id) => self.links.get(id.0).map(|l| l.node),
            Frame::Joint(id) => self.joints.get(id.0).map(Joint::node),
            Frame::Visual(id) => self.visuals.get(id.0).map(|v| v.node),
            Frame::Collision(id) => self.collisions.get(id.0).map(|c| c.node),
        }
    }

    /// Scene node of a named frame.
    #[must_use]
    pub fn frame_node(&self, name: &str) -> Option<&SceneNode> {
        let frame = self.frame(name)?;
        self.scene.node(self.frame_node_id(frame)?)
    }

    /// World transform of a named frame.
    #[must_use]
    pub fn world_transform(&self, name: &str) -> Option<Matrix4<f64>> {
        let frame = self.frame(name)?;
        self.scene.world_matrix(self.frame_node_id(frame)?)
    }

    /// Links with no parent joint, in document order.
    pub fn root_links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.iter().filter(|l| l.parent_joint.is_none())
    }

    /// Set a joint's value and propagate it to every joint that mimics it.
    ///
    /// Returns `false` for an unknown joint name. Otherwise returns whether
    /// the joint or any of its mimics changed.
    pub fn set_joint_value(&mut self, name: &str, value: impl Into<JointCommand>) -> bool {
        let Some(&id) = self.joint_map.get(name) else {
            return false;
        };
        let command = value.into();
        mimic::drive(
            &mut self.joints,
            &mut self.scene,
            &self.mimic_graph,
            id,
            &command,
        )
    }

    /// Set several joints in iteration order. Returns whether any changed.
    pub fn set_joint_values<I, K, V>(&mut self, values: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<JointCommand>,
    {
        let mut changed = false;
        for (name, value) in values {
            changed |= self.set_joint_value(name.as_ref(), value);
        }
        changed
    }

    /// Current value vector of every joint, by name.
    #[must_use]
    pub fn joint_values(&self) -> HashMap<String, Vec<f64>> {
        self.joints
            .iter()
            .map(|j| (j.name().to_string(), j.value().to_vec()))
            .collect()
    }

    /// Enable or disable limit clamping on every joint.
    pub fn set_ignore_limits(&mut self, ignore: bool) {
        for joint in &mut self.joints {
            joint.set_ignore_limits(ignore);
        }
    }

    /// Attach or fail a pending mesh from a loader response.
    ///
    /// Returns whether a mesh node was attached.
    pub(crate) fn resolve_mesh(&mut self, response: MeshResponse) -> bool {
        let Some(pending) = self.meshes.get_mut(response.ticket.slot) else {
            tracing::warn!("Mesh response for unknown slot {}", response.ticket.slot);
            return false;
        };
        if pending.state != MeshState::Pending {
            tracing::debug!("Ignoring repeated completion for mesh '{}'", pending.path);
            return false;
        }

        match response.result {
            Ok(mesh) => {
                let transform = mesh_transform(
                    &pending.origin.xyz,
                    &pending.origin.rpy,
                    &pending.scale,
                    &mesh.scale,
                );
                let kind = NodeKind::Mesh {
                    asset: mesh.asset,
                    material: pending.material.clone(),
                };
                let carrier = pending.carrier;
                let node = self.scene.insert(None, kind, transform);
                self.scene.add_child(carrier, node);
                pending.state = MeshState::Attached(node);
                true
            }
            Err(e) => {
                tracing::error!("{}", e);
                pending.state = MeshState::Failed;
                false
            }
        }
    }
}
