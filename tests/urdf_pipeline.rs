//! End-to-end tests: document to robot to joint updates.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};
use urdf_kinematics::{
    AssetId, Frame, JointLimit, JointType, LinkId, LoadedMesh, LoaderOptions, MeshCompletion,
    MeshRequest, MeshState, NodeKind, PackageSpec, Robot, Transform, UrdfError, UrdfJoint,
    UrdfLink, UrdfLoader, UrdfMimic, UrdfRobot, VisualId, load_urdf_str,
};

// =============================================================================
// Fixtures
// =============================================================================

const TWO_LINK: &str = r#"
    <robot name="two_link">
        <link name="LINK1"/>
        <link name="LINK2"/>
        <joint name="JOINT1" type="continuous">
            <origin xyz="0 0 1"/>
            <parent link="LINK1"/>
            <child link="LINK2"/>
            <axis xyz="0 0 -1"/>
        </joint>
    </robot>
"#;

const MIMIC_CHAIN: &str = r#"
    <robot name="mimic_chain">
        <link name="base"/>
        <link name="l_d"/>
        <link name="l_m1"/>
        <link name="l_m2"/>
        <joint name="D" type="continuous">
            <parent link="base"/>
            <child link="l_d"/>
            <axis xyz="0 0 1"/>
        </joint>
        <joint name="M1" type="continuous">
            <parent link="base"/>
            <child link="l_m1"/>
            <axis xyz="0 0 1"/>
            <mimic joint="D" multiplier="2" offset="5"/>
        </joint>
        <joint name="M2" type="continuous">
            <parent link="l_m1"/>
            <child link="l_m2"/>
            <axis xyz="0 0 1"/>
            <mimic joint="M1"/>
        </joint>
    </robot>
"#;

const GRIPPER: &str = r#"
    <robot name="gripper">
        <material name="steel"><color rgba="0.6 0.6 0.65 1"/></material>
        <link name="palm">
            <inertial>
                <mass value="0.35"/>
                <inertia ixx="0.001" ixy="0" ixz="0" iyy="0.002" iyz="0" izz="0.003"/>
            </inertial>
            <visual name="palm_shell">
                <geometry><mesh filename="package://gripper/meshes/palm.stl"/></geometry>
                <material name="steel"/>
            </visual>
            <visual name="palm_marker">
                <origin xyz="0 0 0.05"/>
                <geometry><sphere radius="0.01"/></geometry>
            </visual>
        </link>
        <link name="left_finger"/>
        <link name="right_finger"/>
        <joint name="left" type="prismatic">
            <parent link="palm"/>
            <child link="left_finger"/>
            <origin xyz="0 0.02 0.1" rpy="0 0 1.5707963267948966"/>
            <axis xyz="1 0 0"/>
            <limit lower="0" upper="0.04" effort="20" velocity="0.1"/>
        </joint>
        <joint name="right" type="prismatic">
            <parent link="palm"/>
            <child link="right_finger"/>
            <origin xyz="0 -0.02 0.1"/>
            <axis xyz="0 -1 0"/>
            <limit lower="0" upper="0.04"/>
            <mimic joint="left"/>
        </joint>
    </robot>
"#;

fn angle(robot: &Robot, joint: &str) -> f64 {
    robot.joint(joint).unwrap().angle().unwrap()
}

// =============================================================================
// Parsing and joint updates
// =============================================================================

#[test]
fn continuous_joint_end_to_end() {
    let mut robot = load_urdf_str(TWO_LINK).unwrap();

    let changed = robot.set_joint_values([("JOINT1", 1.0)]);
    assert!(changed);
    assert_eq!(robot.joint("JOINT1").unwrap().angle(), Some(1.0));

    let joint = robot.joint("JOINT1").unwrap();
    assert_relative_eq!(*joint.axis(), Vector3::new(0.0, 0.0, -1.0));
    let node = robot.scene().node(joint.node()).unwrap();
    let expected = UnitQuaternion::from_axis_angle(&-Vector3::z_axis(), 1.0);
    assert_relative_eq!(node.transform.rotation, expected, epsilon = 1e-12);
    assert_relative_eq!(node.transform.position, Vector3::new(0.0, 0.0, 1.0));

    // Same value again: nothing changes.
    assert!(!robot.set_joint_values([("JOINT1", 1.0)]));
}

#[test]
fn changing_joint_type_returns_node_to_origin() {
    let mut robot = load_urdf_str(TWO_LINK).unwrap();
    robot.set_joint_value("JOINT1", 1.0);

    assert!(robot.set_joint_type("JOINT1", JointType::Fixed));
    let joint = robot.joint("JOINT1").unwrap();
    assert_eq!(joint.joint_type(), JointType::Fixed);
    assert!(joint.value().is_empty());

    let node = robot.scene().node(joint.node()).unwrap();
    let origin = Transform::from_parts(Vector3::new(0.0, 0.0, 1.0), UnitQuaternion::identity());
    assert_eq!(node.transform, origin);
    assert!(!robot.set_joint_value("JOINT1", 2.0));

    // Same type again is not a change; unknown names are ignored.
    assert!(!robot.set_joint_type("JOINT1", JointType::Fixed));
    assert!(!robot.set_joint_type("NOPE", JointType::Revolute));

    assert!(robot.set_joint_type("JOINT1", JointType::Continuous));
    assert_eq!(robot.joint("JOINT1").unwrap().value(), &[0.0]);
    assert!(robot.set_joint_value("JOINT1", 0.5));
    assert_relative_eq!(angle(&robot, "JOINT1"), 0.5);
}

#[test]
fn unknown_joint_is_not_a_change() {
    let mut robot = load_urdf_str(TWO_LINK).unwrap();
    assert!(!robot.set_joint_value("NOPE", 1.0));
    assert!(robot.set_joint_values([("NOPE", 1.0), ("JOINT1", 0.5)]));
}

#[test]
fn mimic_chain_propagates() {
    let mut robot = load_urdf_str(MIMIC_CHAIN).unwrap();
    assert!(robot.set_joint_value("D", 10.0));

    assert_relative_eq!(angle(&robot, "D"), 10.0);
    assert_relative_eq!(angle(&robot, "M1"), 25.0);
    assert_relative_eq!(angle(&robot, "M2"), 25.0);

    let m2 = robot.joint("M2").unwrap();
    let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 25.0);
    let node = robot.scene().node(m2.node()).unwrap();
    assert_relative_eq!(node.transform.rotation, expected, epsilon = 1e-9);
}

#[test]
fn mimic_refreshes_after_direct_manipulation() {
    let mut robot = load_urdf_str(MIMIC_CHAIN).unwrap();
    robot.set_joint_value("D", 1.0);

    // Knock the mimic out of sync, then re-send the unchanged driver value.
    assert!(robot.set_joint_value("M1", 0.0));
    assert!(robot.set_joint_value("D", 1.0));
    assert_relative_eq!(angle(&robot, "M1"), 7.0);
    assert_relative_eq!(angle(&robot, "M2"), 7.0);
}

#[test]
fn mimic_cycle_fails_to_parse() {
    let xml = r#"
        <robot name="cycle">
            <link name="base"/>
            <link name="a"/>
            <link name="b"/>
            <joint name="A" type="continuous">
                <parent link="base"/><child link="a"/>
                <mimic joint="B"/>
            </joint>
            <joint name="B" type="continuous">
                <parent link="base"/><child link="b"/>
                <mimic joint="A"/>
            </joint>
        </robot>
    "#;
    match load_urdf_str(xml) {
        Err(UrdfError::MimicCycle(path)) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"A".to_string()));
            assert!(path.contains(&"B".to_string()));
        }
        other => panic!("expected mimic cycle, got {other:?}"),
    }
}

#[test]
fn missing_robot_root_is_fatal() {
    let result = load_urdf_str(r#"<?xml version="1.0"?><sdf version="1.6"/>"#);
    assert!(matches!(result, Err(UrdfError::MalformedDocument(_))));
}

#[test]
fn prismatic_limits_and_mimic() {
    let mut robot = load_urdf_str(GRIPPER).unwrap();

    // The driver clamps to its limit; the mimic follows the requested value
    // and clamps to its own limit.
    assert!(robot.set_joint_value("left", 0.1));
    assert_relative_eq!(angle(&robot, "left"), 0.04);
    assert_relative_eq!(angle(&robot, "right"), 0.04);

    // Left slides along +X rotated by its origin yaw, i.e. along +Y.
    let left = robot.world_transform("left_finger").unwrap();
    assert_relative_eq!(left[(1, 3)], 0.06, epsilon = 1e-12);
    assert_relative_eq!(left[(0, 3)], 0.0, epsilon = 1e-12);

    let right = robot.world_transform("right_finger").unwrap();
    assert_relative_eq!(right[(1, 3)], -0.06, epsilon = 1e-12);

    robot.set_ignore_limits(true);
    assert!(robot.set_joint_value("left", 0.1));
    assert_relative_eq!(angle(&robot, "right"), 0.1);
}

#[test]
fn joint_metadata_survives() {
    let robot = load_urdf_str(GRIPPER).unwrap();
    let left = robot.joint("left").unwrap();
    assert_eq!(left.joint_type(), JointType::Prismatic);
    assert_eq!(
        *left.limit(),
        JointLimit {
            lower: 0.0,
            upper: 0.04,
            effort: Some(20.0),
            velocity: Some(0.1),
        }
    );
    let right = robot.joint("right").unwrap();
    assert_eq!(right.limit().effort, None);
    assert!(right.is_mimic());

    let palm = robot.link("palm").unwrap();
    assert_relative_eq!(palm.inertial().unwrap().mass, 0.35);
    assert_relative_eq!(palm.inertial().unwrap().inertia.izz, 0.003);
}

#[test]
fn joint_values_snapshot() {
    let mut robot = load_urdf_str(MIMIC_CHAIN).unwrap();
    robot.set_joint_value("D", 1.0);
    let values: HashMap<String, Vec<f64>> = robot.joint_values();
    assert_eq!(values.len(), 3);
    assert_eq!(values["D"], vec![1.0]);
    assert_eq!(values["M1"], vec![7.0]);
}

#[test]
fn frames_cover_all_maps() {
    let robot = load_urdf_str(GRIPPER).unwrap();
    assert!(matches!(robot.frame("palm"), Some(Frame::Link(_))));
    assert!(matches!(robot.frame("left"), Some(Frame::Joint(_))));
    assert!(matches!(robot.frame("palm_marker"), Some(Frame::Visual(_))));
    assert!(robot.frame("nothing").is_none());

    let marker = robot.world_transform("palm_marker").unwrap();
    assert_relative_eq!(marker[(2, 3)], 0.05, epsilon = 1e-12);
}

#[test]
fn frame_from_another_robot_has_no_node() {
    let gripper = load_urdf_str(GRIPPER).unwrap();
    let two_link = load_urdf_str(TWO_LINK).unwrap();

    let right_finger = gripper.frame("right_finger").unwrap();
    assert_eq!(right_finger, Frame::Link(LinkId(2)));
    assert!(gripper.frame_node_id(right_finger).is_some());
    assert_eq!(two_link.frame_node_id(right_finger), None);
    assert_eq!(two_link.frame_node_id(Frame::Visual(VisualId(0))), None);
}

// =============================================================================
// Clone fidelity
// =============================================================================

#[test]
fn clone_is_independent_and_faithful() {
    let mut original = load_urdf_str(MIMIC_CHAIN).unwrap();
    original.set_joint_value("D", 0.5);
    let mut copy = original.clone();

    let mut names: Vec<_> = original.joint_map().keys().cloned().collect();
    let mut copy_names: Vec<_> = copy.joint_map().keys().cloned().collect();
    names.sort();
    copy_names.sort();
    assert_eq!(names, copy_names);
    assert_eq!(original.frames().len(), copy.frames().len());

    for (a, b) in original.joints().iter().zip(copy.joints()) {
        assert_eq!(a.limit(), b.limit());
        assert_eq!(a.axis(), b.axis());
        assert_eq!(a.value(), b.value());
        assert_eq!(a.mimic(), b.mimic());
    }

    // Driving the copy moves the copy's mimics only.
    copy.set_joint_value("D", 2.0);
    assert_relative_eq!(angle(&copy, "M2"), 9.0);
    assert_relative_eq!(angle(&original, "M2"), 6.0);

    let m1 = copy.joint("M1").unwrap();
    let node = copy.scene().node(m1.node()).unwrap();
    let wrapped = 9.0 % std::f64::consts::TAU;
    assert_relative_eq!(node.transform.rotation.angle(), wrapped, epsilon = 1e-9);
}

// =============================================================================
// Descriptions built in code
// =============================================================================

#[test]
fn load_description_without_xml() {
    let description = UrdfRobot::new("coded")
        .with_link(UrdfLink::new("base"))
        .with_link(UrdfLink::new("a"))
        .with_link(UrdfLink::new("b"))
        .with_joint(
            UrdfJoint::new("j1", JointType::Revolute, "base", "a")
                .with_axis(Vector3::z())
                .with_limit(JointLimit::new(-FRAC_PI_2, FRAC_PI_2)),
        )
        .with_joint(
            UrdfJoint::new("j2", JointType::Revolute, "base", "b")
                .with_axis(Vector3::z())
                .with_limit(JointLimit::new(-1.0, 1.0))
                .with_mimic(UrdfMimic {
                    joint: "j1".into(),
                    multiplier: -1.0,
                    offset: 0.0,
                }),
        );

    let mut robot = UrdfLoader::new().load_description(&description).unwrap();
    assert!(robot.set_joint_value("j1", 0.5));
    assert_relative_eq!(angle(&robot, "j2"), -0.5);

    let j2 = robot.joint("j2").unwrap();
    assert!(matches!(
        robot.scene().node(j2.node()).unwrap().kind,
        NodeKind::MimicJoint(_)
    ));
}

// =============================================================================
// Packages and meshes
// =============================================================================

#[test]
fn package_map_resolves_and_missing_package_is_skipped() {
    let xml = r#"
        <robot name="pkgs">
            <link name="base">
                <visual name="a"><geometry><mesh filename="package://pkgA/mesh.stl"/></geometry></visual>
                <visual name="b"><geometry><mesh filename="package://pkgB/mesh.stl"/></geometry></visual>
            </link>
        </robot>
    "#;

    let requested: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&requested);
    let options = LoaderOptions::default()
        .with_packages(PackageSpec::map([("pkgA", "/path/a")]))
        .with_mesh_loader(move |request: MeshRequest, completion: MeshCompletion| {
            sink.lock().unwrap().push(request.path.clone());
            completion.succeed(LoadedMesh::new(AssetId(1)));
        });

    let robot = UrdfLoader::with_options(options).load_str(xml).unwrap();
    assert_eq!(requested.lock().unwrap().as_slice(), &["/path/a/mesh.stl".to_string()]);

    // Both carriers exist; only the resolvable one has geometry.
    let a = robot.visual("a").unwrap();
    let b = robot.visual("b").unwrap();
    assert_eq!(robot.scene().node(a.node()).unwrap().children().len(), 1);
    assert!(robot.scene().node(b.node()).unwrap().children().is_empty());
}

#[test]
fn mesh_attaches_with_material_after_completion() {
    let parked: Arc<Mutex<Option<MeshCompletion>>> = Arc::default();
    let sink = Arc::clone(&parked);
    let options = LoaderOptions::default()
        .with_packages("/ws/src/gripper")
        .with_mesh_loader(move |request: MeshRequest, completion: MeshCompletion| {
            assert_eq!(request.path, "/ws/src/gripper/meshes/palm.stl");
            assert_eq!(request.extension.as_deref(), Some("stl"));
            *sink.lock().unwrap() = Some(completion);
        });
    let mut loader = UrdfLoader::with_options(options);
    let mut robot = loader.load_str(GRIPPER).unwrap();
    assert_eq!(robot.pending_mesh_count(), 1);
    assert_eq!(loader.attach_loaded_meshes(&mut robot), 0);

    let completion = parked.lock().unwrap().take().unwrap();
    completion.succeed(LoadedMesh {
        asset: AssetId(9),
        scale: Vector3::repeat(0.001),
    });
    assert_eq!(loader.attach_loaded_meshes(&mut robot), 1);

    let MeshState::Attached(node) = robot.meshes()[0].state() else {
        panic!("mesh should be attached");
    };
    let mesh = robot.scene().node(node).unwrap();
    match &mesh.kind {
        NodeKind::Mesh { asset, material } => {
            assert_eq!(*asset, AssetId(9));
            assert_eq!(material.as_ref().unwrap().color, [0.6, 0.6, 0.65]);
        }
        other => panic!("expected mesh node, got {other:?}"),
    }
    assert_relative_eq!(mesh.transform.scale, Vector3::repeat(0.001));
}

#[test]
fn clone_with_pending_mesh_shares_its_slot() {
    let parked: Arc<Mutex<Option<MeshCompletion>>> = Arc::default();
    let sink = Arc::clone(&parked);
    let options = LoaderOptions::default()
        .with_packages("/ws/src/gripper")
        .with_mesh_loader(move |_request: MeshRequest, completion: MeshCompletion| {
            *sink.lock().unwrap() = Some(completion);
        });
    let mut loader = UrdfLoader::with_options(options);
    let mut original = loader.load_str(GRIPPER).unwrap();
    let mut copy = original.clone();
    assert_eq!(copy.generation(), original.generation());

    let completion = parked.lock().unwrap().take().unwrap();
    completion.succeed(LoadedMesh::new(AssetId(4)));

    // The first copy handed to the loader takes the completion.
    assert_eq!(loader.attach_loaded_meshes(&mut copy), 1);
    assert_eq!(loader.attach_loaded_meshes(&mut original), 0);
    assert_eq!(copy.pending_mesh_count(), 0);
    assert_eq!(original.pending_mesh_count(), 1);

    // Cloning once nothing is pending yields a complete copy.
    let complete = copy.clone();
    assert_eq!(complete.pending_mesh_count(), 0);
    assert!(matches!(complete.meshes()[0].state(), MeshState::Attached(_)));
}
