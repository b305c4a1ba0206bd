//! Compiles a parsed [`UrdfRobot`] into a live [`Robot`].
//!
//! Construction order: named materials, links with their visuals and
//! collisions, joints (which wire child links under their joint nodes),
//! mimic relations, and finally the name and frame maps. Mesh requests are
//! dispatched only once the whole robot has been validated.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;

use nalgebra::Vector3;

use crate::error::{Result, UrdfError};
use crate::geometry::{MeshCompletion, MeshRequest, MeshResponse, MeshTicket, primitive_for};
use crate::joint::Joint;
use crate::loader::LoaderOptions;
use crate::material::{Material, MaterialRegistry};
use crate::mimic::{Mimic, MimicGraph};
use crate::package::{extension_hint, resolve_path};
use crate::robot::{
    Collision, CollisionId, Frame, JointId, Link, LinkId, MeshState, PendingMesh, Robot, Visual,
    VisualId,
};
use crate::rotation::apply_rotation;
use crate::scene::{NodeId, NodeKind, SceneGraph, Transform};
use crate::types::{UrdfCollision, UrdfGeometry, UrdfOrigin, UrdfRobot, UrdfVisual};

/// Build a robot from its description.
///
/// `generation` tags every mesh request issued for this robot; completions
/// arrive on `sender`.
pub(crate) fn build_robot(
    desc: &UrdfRobot,
    options: &LoaderOptions,
    generation: u64,
    sender: &Sender<MeshResponse>,
) -> Result<Robot> {
    check_duplicates(desc)?;

    let mut builder = RobotBuilder::new(desc, options);
    builder.register_materials(desc);
    builder.add_links(desc)?;
    builder.add_joints(desc)?;
    let mimic_graph = builder.resolve_mimics(desc)?;
    let robot = builder.finish(desc, mimic_graph, generation);

    dispatch_meshes(&robot, options, sender);
    tracing::debug!(
        "Built robot '{}': {} links, {} joints, {} mesh requests",
        robot.name(),
        robot.links().len(),
        robot.joints().len(),
        robot.meshes().len()
    );
    Ok(robot)
}

/// Check for duplicate link and joint names.
fn check_duplicates(robot: &UrdfRobot) -> Result<()> {
    let mut link_names = HashSet::new();
    for link in &robot.links {
        if !link_names.insert(&link.name) {
            return Err(UrdfError::DuplicateLink(link.name.clone()));
        }
    }

    let mut joint_names = HashSet::new();
    for joint in &robot.joints {
        if !joint_names.insert(&joint.name) {
            return Err(UrdfError::DuplicateJoint(joint.name.clone()));
        }
    }

    Ok(())
}

/// Local transform for an `<origin>`.
fn origin_transform(origin: &UrdfOrigin) -> Transform {
    let mut transform = Transform::identity();
    transform.position = origin.xyz;
    apply_rotation(&mut transform, &origin.rpy, false);
    transform
}

struct RobotBuilder<'a> {
    options: &'a LoaderOptions,
    scene: SceneGraph,
    root: NodeId,
    materials: MaterialRegistry,
    links: Vec<Link>,
    joints: Vec<Joint>,
    visuals: Vec<Visual>,
    collisions: Vec<Collision>,
    meshes: Vec<PendingMesh>,
    link_map: HashMap<String, LinkId>,
    joint_map: HashMap<String, JointId>,
}

impl<'a> RobotBuilder<'a> {
    fn new(desc: &UrdfRobot, options: &'a LoaderOptions) -> Self {
        let mut scene = SceneGraph::new();
        let name = (!desc.name.is_empty()).then(|| desc.name.clone());
        let root = scene.insert(name, NodeKind::Robot, Transform::identity());

        Self {
            options,
            scene,
            root,
            materials: MaterialRegistry::new(),
            links: Vec::with_capacity(desc.links.len()),
            joints: Vec::with_capacity(desc.joints.len()),
            visuals: Vec::new(),
            collisions: Vec::new(),
            meshes: Vec::new(),
            link_map: HashMap::new(),
            joint_map: HashMap::new(),
        }
    }

    fn register_materials(&mut self, desc: &UrdfRobot) {
        for material in &desc.materials {
            self.materials.register(Material::from_description(
                material,
                &self.options.packages,
                &self.options.working_path,
            ));
        }
    }

    // ========================================================================
    // Links
    // ========================================================================

    fn add_links(&mut self, desc: &UrdfRobot) -> Result<()> {
        let children: HashSet<&str> = desc.joints.iter().map(|j| j.child.as_str()).collect();

        for link_desc in &desc.links {
            let id = LinkId(self.links.len());
            let node = self.scene.insert(
                Some(link_desc.name.clone()),
                NodeKind::Link(id),
                Transform::identity(),
            );
            if !children.contains(link_desc.name.as_str()) {
                self.scene.add_child(self.root, node);
            }

            self.links.push(Link {
                name: link_desc.name.clone(),
                inertial: link_desc.inertial,
                visuals: Vec::new(),
                collisions: Vec::new(),
                parent_joint: None,
                child_joints: Vec::new(),
                node,
            });
            self.link_map.insert(link_desc.name.clone(), id);

            if self.options.parse_visual {
                for visual in &link_desc.visuals {
                    self.add_visual(id, visual)?;
                }
            }
            if self.options.parse_collision {
                for collision in &link_desc.collisions {
                    self.add_collision(id, collision);
                }
            }
        }

        Ok(())
    }

    fn add_visual(&mut self, link: LinkId, desc: &UrdfVisual) -> Result<()> {
        let material = match &desc.material {
            Some(reference) => self.materials.resolve(
                reference,
                self.options.material_policy,
                &self.options.packages,
                &self.options.working_path,
            )?,
            None => Material::default(),
        };

        let id = VisualId(self.visuals.len());
        let node = self.scene.insert(
            desc.name.clone(),
            NodeKind::Visual(id),
            Transform::identity(),
        );
        self.scene.add_child(self.links[link.0].node, node);
        self.attach_geometry(
            node,
            &desc.origin,
            desc.geometry.as_ref(),
            Some(material.clone()),
        );

        self.visuals.push(Visual {
            name: desc.name.clone(),
            link,
            origin: desc.origin,
            geometry: desc.geometry.clone(),
            material,
            node,
        });
        self.links[link.0].visuals.push(id);
        Ok(())
    }

    fn add_collision(&mut self, link: LinkId, desc: &UrdfCollision) {
        let id = CollisionId(self.collisions.len());
        let node = self.scene.insert(
            desc.name.clone(),
            NodeKind::Collision(id),
            Transform::identity(),
        );
        self.scene.add_child(self.links[link.0].node, node);
        self.attach_geometry(node, &desc.origin, desc.geometry.as_ref(), None);

        self.collisions.push(Collision {
            name: desc.name.clone(),
            link,
            origin: desc.origin,
            geometry: desc.geometry.clone(),
            node,
        });
        self.links[link.0].collisions.push(id);
    }

    /// Place a primitive under `carrier` now, or record a mesh request.
    fn attach_geometry(
        &mut self,
        carrier: NodeId,
        origin: &UrdfOrigin,
        geometry: Option<&UrdfGeometry>,
        material: Option<Material>,
    ) {
        let Some(geometry) = geometry else {
            tracing::warn!("Geometry element has no recognized shape, nothing attached");
            return;
        };

        if let UrdfGeometry::Mesh { filename, scale } = geometry {
            let scale = scale.unwrap_or_else(|| Vector3::repeat(1.0));
            self.request_mesh(carrier, origin, filename, scale, material);
            return;
        }

        let Some((shape, transform)) = primitive_for(geometry) else {
            return;
        };
        if let Some(node) = self.scene.node_mut(carrier) {
            node.transform = origin_transform(origin);
        }
        let primitive = self
            .scene
            .insert(None, NodeKind::Primitive { shape, material }, transform);
        self.scene.add_child(carrier, primitive);
    }

    fn request_mesh(
        &mut self,
        carrier: NodeId,
        origin: &UrdfOrigin,
        filename: &str,
        scale: Vector3<f64>,
        material: Option<Material>,
    ) {
        let path = match resolve_path(filename, &self.options.packages, &self.options.working_path)
        {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Skipping mesh '{}': {}", filename, e);
                return;
            }
        };

        if self.options.mesh_loader.is_none() {
            tracing::warn!("No mesh loader configured, skipping mesh '{}'", path);
            return;
        }

        self.meshes.push(PendingMesh {
            path,
            carrier,
            origin: *origin,
            scale,
            material,
            state: MeshState::Pending,
        });
    }

    // ========================================================================
    // Joints
    // ========================================================================

    fn add_joints(&mut self, desc: &UrdfRobot) -> Result<()> {
        for joint_desc in &desc.joints {
            let id = JointId(self.joints.len());
            let lookup = |name: &str| {
                self.link_map
                    .get(name)
                    .copied()
                    .ok_or_else(|| UrdfError::undefined_link(name, &joint_desc.name))
            };
            let parent = lookup(&joint_desc.parent)?;
            let child = lookup(&joint_desc.child)?;

            if self.links[child.0].parent_joint.is_some() {
                return Err(UrdfError::KinematicLoop(format!(
                    "link '{}' has multiple parent joints",
                    joint_desc.child
                )));
            }

            let kind = if joint_desc.mimic.is_some() {
                NodeKind::MimicJoint(id)
            } else {
                NodeKind::Joint(id)
            };
            let node = self.scene.insert(
                Some(joint_desc.name.clone()),
                kind,
                origin_transform(&joint_desc.origin),
            );

            self.scene.add_child(self.links[parent.0].node, node);
            if !self.scene.add_child(node, self.links[child.0].node) {
                return Err(UrdfError::KinematicLoop(format!(
                    "joint '{}' closes a loop through link '{}'",
                    joint_desc.name, joint_desc.child
                )));
            }

            self.links[child.0].parent_joint = Some(id);
            self.links[parent.0].child_joints.push(id);
            self.joints.push(
                Joint::new(&joint_desc.name, joint_desc.joint_type, parent, child, node)
                    .with_axis(joint_desc.axis)
                    .with_limit(joint_desc.limit),
            );
            self.joint_map.insert(joint_desc.name.clone(), id);
        }

        Ok(())
    }

    /// Link each mimic joint to its driver and reject dependency cycles.
    fn resolve_mimics(&mut self, desc: &UrdfRobot) -> Result<MimicGraph> {
        for (i, joint_desc) in desc.joints.iter().enumerate() {
            let Some(mimic) = &joint_desc.mimic else {
                continue;
            };
            let driver = self
                .joint_map
                .get(&mimic.joint)
                .copied()
                .ok_or_else(|| UrdfError::undefined_mimic(&joint_desc.name, &mimic.joint))?;
            self.joints[i].set_mimic(Mimic {
                driver,
                multiplier: mimic.multiplier,
                offset: mimic.offset,
            });
        }

        let mimics: Vec<Option<Mimic>> = self.joints.iter().map(Joint::mimic).collect();
        let graph = MimicGraph::from_mimics(&mimics);
        if let Some(cycle) = graph.find_cycle() {
            let names = cycle
                .iter()
                .map(|id| self.joints[id.0].name().to_string())
                .collect();
            return Err(UrdfError::MimicCycle(names));
        }

        Ok(graph)
    }

    // ========================================================================
    // Maps
    // ========================================================================

    fn finish(self, desc: &UrdfRobot, mimic_graph: MimicGraph, generation: u64) -> Robot {
        let visual_map: HashMap<String, VisualId> = self
            .visuals
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.name.clone().map(|n| (n, VisualId(i))))
            .collect();
        let collision_map: HashMap<String, CollisionId> = self
            .collisions
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.name.clone().map(|n| (n, CollisionId(i))))
            .collect();

        // Later inserts win: joints over links over visuals over collisions.
        let mut frames = HashMap::new();
        frames.extend(
            collision_map
                .iter()
                .map(|(n, &id)| (n.clone(), Frame::Collision(id))),
        );
        frames.extend(visual_map.iter().map(|(n, &id)| (n.clone(), Frame::Visual(id))));
        frames.extend(self.link_map.iter().map(|(n, &id)| (n.clone(), Frame::Link(id))));
        frames.extend(self.joint_map.iter().map(|(n, &id)| (n.clone(), Frame::Joint(id))));

        Robot {
            name: desc.name.clone(),
            scene: self.scene,
            root: self.root,
            links: self.links,
            joints: self.joints,
            visuals: self.visuals,
            collisions: self.collisions,
            link_map: self.link_map,
            joint_map: self.joint_map,
            visual_map,
            collision_map,
            frames,
            mimic_graph,
            materials: self.materials,
            meshes: self.meshes,
            generation,
        }
    }
}

/// Hand every pending mesh of a freshly built robot to the mesh loader.
fn dispatch_meshes(robot: &Robot, options: &LoaderOptions, sender: &Sender<MeshResponse>) {
    let Some(loader) = options.mesh_loader.as_ref() else {
        return;
    };

    for (slot, mesh) in robot.meshes().iter().enumerate() {
        let ticket = MeshTicket {
            generation: robot.generation(),
            slot,
        };
        let request = MeshRequest {
            path: mesh.path().to_string(),
            extension: extension_hint(mesh.path()),
        };
        let completion = MeshCompletion::new(ticket, mesh.path().to_string(), sender.clone());
        loader.load_mesh(request, completion);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::geometry::PrimitiveShape;
    use crate::material::MaterialPolicy;
    use crate::parser::parse_urdf_str;
    use approx::assert_relative_eq;
    use std::sync::mpsc;

    fn build_with(xml: &str, options: &LoaderOptions) -> Result<Robot> {
        let (tx, _rx) = mpsc::channel();
        build_robot(&parse_urdf_str(xml)?, options, 1, &tx)
    }

    fn build(xml: &str) -> Result<Robot> {
        build_with(xml, &LoaderOptions::default())
    }

    const ARM: &str = r#"
        <robot name="arm">
            <material name="grey"><color rgba="0.5 0.5 0.5 1"/></material>
            <link name="base">
                <visual name="base_visual">
                    <origin xyz="0 0 0.1"/>
                    <geometry><cylinder radius="0.2" length="0.2"/></geometry>
                    <material name="grey"/>
                </visual>
                <collision name="base_collision">
                    <geometry><box size="0.4 0.4 0.2"/></geometry>
                </collision>
            </link>
            <link name="upper"/>
            <link name="lower"/>
            <joint name="shoulder" type="revolute">
                <parent link="base"/>
                <child link="upper"/>
                <origin xyz="0 0 0.2"/>
                <axis xyz="0 1 0"/>
                <limit lower="-1" upper="1"/>
            </joint>
            <joint name="elbow" type="revolute">
                <parent link="upper"/>
                <child link="lower"/>
                <origin xyz="0 0 0.5"/>
                <axis xyz="0 1 0"/>
                <limit lower="-2" upper="2"/>
            </joint>
        </robot>
    "#;

    #[test]
    fn test_tree_structure() {
        let robot = build(ARM).unwrap();
        let scene = robot.scene();

        let roots: Vec<_> = robot.root_links().map(Link::name).collect();
        assert_eq!(roots, vec!["base"]);
        assert_eq!(
            scene.node(robot.root()).unwrap().children(),
            &[robot.link("base").unwrap().node()]
        );

        let shoulder = robot.joint("shoulder").unwrap();
        let upper = robot.link("upper").unwrap();
        assert_eq!(
            scene.node(shoulder.node()).unwrap().parent(),
            Some(robot.link("base").unwrap().node())
        );
        assert_eq!(scene.node(upper.node()).unwrap().parent(), Some(shoulder.node()));
        assert_eq!(upper.parent_joint(), Some(JointId(0)));
        assert_eq!(upper.child_joints(), &[JointId(1)]);
    }

    #[test]
    fn test_joint_origin_and_world_transform() {
        let robot = build(ARM).unwrap();
        let m = robot.world_transform("lower").unwrap();
        assert_relative_eq!(m[(2, 3)], 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_visual_primitive_and_material() {
        let robot = build(ARM).unwrap();
        let visual = robot.visual("base_visual").unwrap();
        assert_eq!(visual.material().color, [0.5, 0.5, 0.5]);

        let node = robot.scene().node(visual.node()).unwrap();
        assert_relative_eq!(node.transform.position.z, 0.1);
        let child = robot.scene().node(node.children()[0]).unwrap();
        match &child.kind {
            NodeKind::Primitive { shape, material } => {
                assert_eq!(*shape, PrimitiveShape::Cylinder);
                assert_eq!(material.as_ref().unwrap().color, [0.5, 0.5, 0.5]);
            }
            other => panic!("expected primitive, got {other:?}"),
        }
    }

    #[test]
    fn test_collisions_skipped_by_default() {
        let robot = build(ARM).unwrap();
        assert!(robot.collisions().is_empty());
        assert!(robot.frame("base_collision").is_none());

        let options = LoaderOptions::default().with_collisions(true).with_visuals(false);
        let robot = build_with(ARM, &options).unwrap();
        assert_eq!(robot.collisions().len(), 1);
        assert!(robot.visuals().is_empty());
        assert_eq!(
            robot.frame("base_collision"),
            Some(Frame::Collision(CollisionId(0)))
        );
    }

    #[test]
    fn test_frame_precedence() {
        let xml = r#"
            <robot name="clash">
                <link name="a">
                    <visual name="j"><geometry><sphere radius="1"/></geometry></visual>
                    <visual name="b"><geometry><sphere radius="1"/></geometry></visual>
                </link>
                <link name="b"/>
                <joint name="j" type="fixed">
                    <parent link="a"/>
                    <child link="b"/>
                </joint>
            </robot>
        "#;
        let robot = build(xml).unwrap();
        assert!(matches!(robot.frame("j"), Some(Frame::Joint(_))));
        assert!(matches!(robot.frame("b"), Some(Frame::Link(_))));
        assert_eq!(robot.visual_map().len(), 2);
    }

    #[test]
    fn test_undefined_link() {
        let xml = r#"
            <robot name="bad">
                <link name="a"/>
                <joint name="j" type="fixed">
                    <parent link="a"/>
                    <child link="ghost"/>
                </joint>
            </robot>
        "#;
        assert!(matches!(build(xml), Err(UrdfError::UndefinedLink { .. })));
    }

    #[test]
    fn test_duplicate_names() {
        let xml = r#"<robot name="dup"><link name="a"/><link name="a"/></robot>"#;
        assert!(matches!(build(xml), Err(UrdfError::DuplicateLink(ref n)) if n == "a"));
    }

    #[test]
    fn test_multiple_parents_and_loops() {
        let xml = r#"
            <robot name="loop">
                <link name="a"/>
                <link name="b"/>
                <joint name="j1" type="fixed"><parent link="a"/><child link="b"/></joint>
                <joint name="j2" type="fixed"><parent link="b"/><child link="a"/></joint>
            </robot>
        "#;
        assert!(matches!(build(xml), Err(UrdfError::KinematicLoop(_))));

        let xml = r#"
            <robot name="two_parents">
                <link name="a"/>
                <link name="b"/>
                <link name="c"/>
                <joint name="j1" type="fixed"><parent link="a"/><child link="c"/></joint>
                <joint name="j2" type="fixed"><parent link="b"/><child link="c"/></joint>
            </robot>
        "#;
        assert!(matches!(build(xml), Err(UrdfError::KinematicLoop(_))));
    }

    #[test]
    fn test_mimic_resolution() {
        let xml = r#"
            <robot name="m">
                <link name="a"/>
                <link name="b"/>
                <link name="c"/>
                <joint name="drive" type="continuous"><parent link="a"/><child link="b"/></joint>
                <joint name="follow" type="continuous">
                    <parent link="a"/><child link="c"/>
                    <mimic joint="drive" multiplier="2" offset="5"/>
                </joint>
            </robot>
        "#;
        let robot = build(xml).unwrap();
        let follow = robot.joint("follow").unwrap();
        let mimic = follow.mimic().unwrap();
        assert_eq!(mimic.driver, JointId(0));
        assert_relative_eq!(mimic.multiplier, 2.0);
        assert!(matches!(
            robot.scene().node(follow.node()).unwrap().kind,
            NodeKind::MimicJoint(JointId(1))
        ));
        assert_eq!(robot.mimic_graph().dependents(JointId(0)), &[JointId(1)]);
    }

    #[test]
    fn test_undefined_mimic_driver() {
        let xml = r#"
            <robot name="m">
                <link name="a"/>
                <link name="b"/>
                <joint name="follow" type="continuous">
                    <parent link="a"/><child link="b"/>
                    <mimic joint="nobody"/>
                </joint>
            </robot>
        "#;
        assert!(matches!(
            build(xml),
            Err(UrdfError::UndefinedMimicJoint { ref mimicked, .. }) if mimicked == "nobody"
        ));
    }

    #[test]
    fn test_strict_material_policy() {
        let xml = r#"
            <robot name="m">
                <link name="a">
                    <visual>
                        <geometry><box size="1 1 1"/></geometry>
                        <material name="undefined"/>
                    </visual>
                </link>
            </robot>
        "#;
        let robot = build(xml).unwrap();
        assert_eq!(*robot.visuals()[0].material(), Material::default());

        let strict = LoaderOptions::default().with_material_policy(MaterialPolicy::Strict);
        assert!(matches!(
            build_with(xml, &strict),
            Err(UrdfError::UnknownMaterial(_))
        ));
    }

    #[test]
    fn test_mesh_without_loader_is_skipped() {
        let xml = r#"
            <robot name="m">
                <link name="a">
                    <visual name="shell"><geometry><mesh filename="a.stl"/></geometry></visual>
                </link>
            </robot>
        "#;
        let robot = build(xml).unwrap();
        assert!(robot.meshes().is_empty());
        let visual = robot.visual("shell").unwrap();
        assert!(robot.scene().node(visual.node()).unwrap().children().is_empty());
    }
}
