//! Intermediate representation of a parsed URDF document.
//!
//! These types mirror the URDF XML schema one to one. They can be built by
//! hand and compiled into a live [`Robot`](crate::Robot) with
//! [`UrdfLoader::load_description`](crate::UrdfLoader::load_description).

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::joint::{JointLimit, JointType};
use crate::rotation::rpy_to_quaternion;

/// Normalize a joint axis, falling back to +X (the URDF default) for
/// zero-length or non-finite input.
#[inline]
fn safe_normalize_axis(v: Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > 1e-10 { v / n } else { Vector3::x() }
}

// ============================================================================
// Origin (Pose)
// ============================================================================

/// The `<origin xyz rpy>` element.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfOrigin {
    /// Position (xyz) in meters.
    pub xyz: Vector3<f64>,
    /// Rotation as roll-pitch-yaw (rpy) in radians.
    pub rpy: Vector3<f64>,
}

impl Default for UrdfOrigin {
    fn default() -> Self {
        Self {
            xyz: Vector3::zeros(),
            rpy: Vector3::zeros(),
        }
    }
}

impl UrdfOrigin {
    /// Create from position and rpy.
    #[must_use]
    pub fn new(xyz: Vector3<f64>, rpy: Vector3<f64>) -> Self {
        Self { xyz, rpy }
    }

    /// Create an origin at a position with identity rotation.
    #[must_use]
    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            xyz: Vector3::new(x, y, z),
            rpy: Vector3::zeros(),
        }
    }

    /// Orientation described by `rpy`.
    #[must_use]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        rpy_to_quaternion(&self.rpy)
    }
}

// ============================================================================
// Inertial Properties
// ============================================================================

/// Inertial properties from the `<inertial>` element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfInertial {
    /// Origin of the inertial frame relative to the link frame.
    pub origin: UrdfOrigin,
    /// Mass in kg.
    pub mass: f64,
    /// Inertia tensor.
    pub inertia: UrdfInertia,
}

/// Upper-triangular elements of the symmetric inertia tensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfInertia {
    /// Moment of inertia about X.
    pub ixx: f64,
    /// Product of inertia XY.
    pub ixy: f64,
    /// Product of inertia XZ.
    pub ixz: f64,
    /// Moment of inertia about Y.
    pub iyy: f64,
    /// Product of inertia YZ.
    pub iyz: f64,
    /// Moment of inertia about Z.
    pub izz: f64,
}

impl UrdfInertia {
    /// Full symmetric 3x3 tensor.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.ixx, self.ixy, self.ixz, self.ixy, self.iyy, self.iyz, self.ixz, self.iyz,
            self.izz,
        )
    }
}

// ============================================================================
// Geometry and Materials
// ============================================================================

/// Shape from the `<geometry>` element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UrdfGeometry {
    /// Box with full extents along x, y, z.
    Box {
        /// Size in x, y, z.
        size: Vector3<f64>,
    },
    /// Cylinder along the local Z axis.
    Cylinder {
        /// Radius in meters.
        radius: f64,
        /// Length in meters.
        length: f64,
    },
    /// Sphere.
    Sphere {
        /// Radius in meters.
        radius: f64,
    },
    /// External mesh file.
    Mesh {
        /// Raw filename, possibly a `package://` URI.
        filename: String,
        /// Optional per-axis scale.
        scale: Option<Vector3<f64>>,
    },
}

/// A `<material>` element, either top-level or inline on a visual.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfMaterial {
    /// Material name.
    pub name: Option<String>,
    /// `<color rgba>` values.
    pub rgba: Option<[f64; 4]>,
    /// `<texture filename>` value.
    pub texture: Option<String>,
}

impl UrdfMaterial {
    /// Whether the element carries its own color or texture.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.rgba.is_some() || self.texture.is_some()
    }
}

/// The `<visual>` element.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfVisual {
    /// Optional name.
    pub name: Option<String>,
    /// Origin relative to the link frame.
    pub origin: UrdfOrigin,
    /// Shape, if the `<geometry>` held a recognized one.
    pub geometry: Option<UrdfGeometry>,
    /// Material reference or inline definition.
    pub material: Option<UrdfMaterial>,
}

/// The `<collision>` element.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfCollision {
    /// Optional name.
    pub name: Option<String>,
    /// Origin relative to the link frame.
    pub origin: UrdfOrigin,
    /// Shape, if the `<geometry>` held a recognized one.
    pub geometry: Option<UrdfGeometry>,
}

// ============================================================================
// Link
// ============================================================================

/// The `<link>` element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfLink {
    /// Link name (unique within the robot).
    pub name: String,
    /// Inertial properties.
    pub inertial: Option<UrdfInertial>,
    /// Visual geometries.
    pub visuals: Vec<UrdfVisual>,
    /// Collision geometries.
    pub collisions: Vec<UrdfCollision>,
}

impl UrdfLink {
    /// Create a link with just a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inertial: None,
            visuals: Vec::new(),
            collisions: Vec::new(),
        }
    }

    /// Set inertial properties.
    #[must_use]
    pub fn with_inertial(mut self, inertial: UrdfInertial) -> Self {
        self.inertial = Some(inertial);
        self
    }

    /// Add a visual.
    #[must_use]
    pub fn with_visual(mut self, visual: UrdfVisual) -> Self {
        self.visuals.push(visual);
        self
    }

    /// Add a collision geometry.
    #[must_use]
    pub fn with_collision(mut self, collision: UrdfCollision) -> Self {
        self.collisions.push(collision);
        self
    }
}

// ============================================================================
// Joint
// ============================================================================

/// The `<mimic joint offset multiplier>` element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfMimic {
    /// Name of the driving joint.
    pub joint: String,
    /// Scale applied to the driver's value.
    pub multiplier: f64,
    /// Offset added after scaling.
    pub offset: f64,
}

impl UrdfMimic {
    /// Mimic `joint` with multiplier 1 and offset 0.
    #[must_use]
    pub fn new(joint: impl Into<String>) -> Self {
        Self {
            joint: joint.into(),
            multiplier: 1.0,
            offset: 0.0,
        }
    }
}

/// The `<joint>` element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfJoint {
    /// Joint name (unique within the robot).
    pub name: String,
    /// Joint type.
    pub joint_type: JointType,
    /// Parent link name.
    pub parent: String,
    /// Child link name.
    pub child: String,
    /// Joint frame relative to the parent link frame.
    pub origin: UrdfOrigin,
    /// Unit axis in the joint frame (default +X).
    pub axis: Vector3<f64>,
    /// Position limits.
    pub limit: JointLimit,
    /// Mimic relation, if any.
    pub mimic: Option<UrdfMimic>,
}

impl UrdfJoint {
    /// Create a new joint.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        joint_type: JointType,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            joint_type,
            parent: parent.into(),
            child: child.into(),
            origin: UrdfOrigin::default(),
            axis: Vector3::x(),
            limit: JointLimit::default(),
            mimic: None,
        }
    }

    /// Set the joint origin.
    #[must_use]
    pub fn with_origin(mut self, origin: UrdfOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Set the joint axis. The axis is normalized.
    #[must_use]
    pub fn with_axis(mut self, axis: Vector3<f64>) -> Self {
        self.axis = safe_normalize_axis(axis);
        self
    }

    /// Set the joint limits.
    #[must_use]
    pub fn with_limit(mut self, limit: JointLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Make this joint mimic another.
    #[must_use]
    pub fn with_mimic(mut self, mimic: UrdfMimic) -> Self {
        self.mimic = Some(mimic);
        self
    }
}

// ============================================================================
// Robot
// ============================================================================

/// A complete parsed robot description.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UrdfRobot {
    /// Robot name.
    pub name: String,
    /// Top-level named materials.
    pub materials: Vec<UrdfMaterial>,
    /// All links in document order.
    pub links: Vec<UrdfLink>,
    /// All joints in document order.
    pub joints: Vec<UrdfJoint>,
}

impl UrdfRobot {
    /// Create an empty robot description.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            materials: Vec::new(),
            links: Vec::new(),
            joints: Vec::new(),
        }
    }

    /// Add a top-level material.
    #[must_use]
    pub fn with_material(mut self, material: UrdfMaterial) -> Self {
        self.materials.push(material);
        self
    }

    /// Add a link.
    #[must_use]
    pub fn with_link(mut self, link: UrdfLink) -> Self {
        self.links.push(link);
        self
    }

    /// Add a joint.
    #[must_use]
    pub fn with_joint(mut self, joint: UrdfJoint) -> Self {
        self.joints.push(joint);
        self
    }

    /// Get a link by name.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&UrdfLink> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Get a joint by name.
    #[must_use]
    pub fn joint(&self, name: &str) -> Option<&UrdfJoint> {
        self.joints.iter().find(|j| j.name == name)
    }
}
