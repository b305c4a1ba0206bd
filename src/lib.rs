//! URDF robot description loader producing a live kinematic model.
//!
//! This crate parses [URDF](http://wiki.ros.org/urdf) (Unified Robot Description Format)
//! documents and compiles them into a [`Robot`]: a scene graph of links,
//! joints, and geometry whose joint values can be set at runtime.
//!
//! # Features
//!
//! - Parse URDF XML from files or strings
//! - Joint kinematics for revolute, continuous, prismatic, and fixed joints
//! - Mimic joints, propagated transitively, with cycle detection
//! - `package://` resolution through a root directory, a map, or a callback
//! - Named and inline materials
//! - Primitive geometry (box, sphere, cylinder) built immediately
//! - Mesh geometry delegated to a caller-provided [`MeshLoader`]
//!
//! # Example
//!
//! ```
//! use urdf_kinematics::load_urdf_str;
//!
//! let urdf = r#"
//!     <robot name="pendulum">
//!         <link name="base"/>
//!         <link name="arm"/>
//!         <joint name="hinge" type="revolute">
//!             <parent link="base"/>
//!             <child link="arm"/>
//!             <origin xyz="0 0 1"/>
//!             <axis xyz="0 1 0"/>
//!             <limit lower="-1" upper="1"/>
//!         </joint>
//!     </robot>
//! "#;
//!
//! let mut robot = load_urdf_str(urdf).expect("should parse");
//! assert_eq!(robot.name(), "pendulum");
//!
//! // Values beyond the limits are clamped.
//! assert!(robot.set_joint_value("hinge", 2.0));
//! assert_eq!(robot.joint("hinge").and_then(|j| j.angle()), Some(1.0));
//!
//! let arm = robot.world_transform("arm").expect("arm frame");
//! assert!((arm[(2, 3)] - 1.0).abs() < 1e-12);
//! ```
//!
//! # Supported URDF Elements
//!
//! ## Links
//!
//! - `<link name="...">` - Rigid body frame
//! - `<inertial>` - Parsed and carried on the link
//! - `<visual>` - Geometry with material (built by default)
//! - `<collision>` - Geometry without material (opt in)
//!
//! ## Joints
//!
//! - `<joint name="..." type="...">` - `fixed`, `revolute`, `continuous`,
//!   `prismatic`, `planar`, `floating`
//! - `<parent>`, `<child>`, `<origin>`, `<axis>`, `<limit>`, `<mimic>`
//!
//! # Limitations
//!
//! - `planar` and `floating` joints store values but do not move
//! - Kinematic loops are rejected (tree structures only)
//! - `<gazebo>` and `<transmission>` extensions are ignored

#![doc(html_root_url = "https://docs.rs/urdf-kinematics/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::should_implement_trait,
    clippy::items_after_statements,
    clippy::float_cmp
)]

mod builder;
mod error;
mod geometry;
mod joint;
mod loader;
mod material;
mod mimic;
mod package;
mod parser;
mod robot;
mod rotation;
mod scene;
mod types;

// Re-export main types
pub use error::{Result, UrdfError};
pub use geometry::{
    AssetId, LoadedMesh, MeshCompletion, MeshLoadError, MeshLoader, MeshRequest, MeshResponse,
    MeshTicket, PrimitiveShape, mesh_transform, primitive_for,
};
pub use joint::{Joint, JointCommand, JointLimit, JointType};
pub use loader::{LoaderOptions, UrdfLoader, load_urdf_file, load_urdf_str};
pub use material::{Material, MaterialPolicy, MaterialRegistry};
pub use mimic::{Mimic, MimicGraph};
pub use package::{PackageResolver, PackageSpec, extension_hint, resolve_path};
pub use parser::parse_urdf_str;
pub use robot::{
    Collision, CollisionId, Frame, JointId, Link, LinkId, MeshState, PendingMesh, Robot, Visual,
    VisualId,
};
pub use rotation::{apply_rotation, parse_number, parse_tuple, rpy_to_quaternion};
pub use scene::{NodeId, NodeKind, SceneGraph, SceneNode, Transform};
pub use types::{
    UrdfCollision, UrdfGeometry, UrdfInertia, UrdfInertial, UrdfJoint, UrdfLink, UrdfMaterial,
    UrdfMimic, UrdfOrigin, UrdfRobot, UrdfVisual,
};
