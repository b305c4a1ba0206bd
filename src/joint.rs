//! Joint kinematic state and the per-type value to pose update.
//!
//! A joint keeps the pose it had when it was first driven as its origin
//! reference. Every later value is applied as a delta on top of that
//! reference, so the joint's local transform is always
//! `origin ∘ f(type, clamped(value))`.

use nalgebra::{UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::mimic::Mimic;
use crate::robot::LinkId;
use crate::scene::{NodeId, Transform};

/// Joint type from URDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum JointType {
    /// Welded, no motion.
    Fixed,
    /// Unlimited rotation about the axis.
    Continuous,
    /// Rotation about the axis within limits.
    Revolute,
    /// Translation along the axis within limits.
    Prismatic,
    /// Planar motion. Values are stored but not applied.
    Planar,
    /// Free 6-DOF motion. Values are stored but not applied.
    Floating,
}

impl JointType {
    /// Parse joint type from its URDF name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "continuous" => Some(Self::Continuous),
            "revolute" => Some(Self::Revolute),
            "prismatic" => Some(Self::Prismatic),
            "planar" => Some(Self::Planar),
            "floating" => Some(Self::Floating),
            _ => None,
        }
    }

    /// Length of the value vector for this type.
    #[must_use]
    pub const fn dof(self) -> usize {
        match self {
            Self::Fixed => 0,
            Self::Continuous | Self::Revolute | Self::Prismatic => 1,
            Self::Planar => 2,
            Self::Floating => 6,
        }
    }

    /// Whether the value is clamped to the joint limits.
    #[must_use]
    pub const fn is_limited(self) -> bool {
        matches!(self, Self::Revolute | Self::Prismatic)
    }

    /// URDF name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Continuous => "continuous",
            Self::Revolute => "revolute",
            Self::Prismatic => "prismatic",
            Self::Planar => "planar",
            Self::Floating => "floating",
        }
    }
}

impl std::fmt::Display for JointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Joint limits from the `<limit>` element.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLimit {
    /// Lower position limit (rad or m).
    pub lower: f64,
    /// Upper position limit (rad or m).
    pub upper: f64,
    /// Maximum effort (N or Nm), if given.
    pub effort: Option<f64>,
    /// Maximum velocity (rad/s or m/s), if given.
    pub velocity: Option<f64>,
}

impl Default for JointLimit {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 0.0,
            effort: None,
            velocity: None,
        }
    }
}

impl JointLimit {
    /// Limits with the given position range.
    #[must_use]
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            ..Default::default()
        }
    }

    /// Clamp a position into `[lower, upper]`. `NaN` passes through.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value > self.upper {
            self.upper
        } else if value < self.lower {
            self.lower
        } else {
            value
        }
    }
}

/// Requested joint value components.
///
/// `None` entries leave the corresponding slot unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointCommand(pub Vec<Option<f64>>);

impl JointCommand {
    /// Component `i`, if present and set.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<f64> {
        self.0.get(i).copied().flatten()
    }

    /// Map every set component.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self(self.0.iter().map(|v| v.map(&f)).collect())
    }
}

impl From<f64> for JointCommand {
    fn from(value: f64) -> Self {
        Self(vec![Some(value)])
    }
}

impl From<Option<f64>> for JointCommand {
    fn from(value: Option<f64>) -> Self {
        Self(vec![value])
    }
}

impl From<&[f64]> for JointCommand {
    fn from(values: &[f64]) -> Self {
        Self(values.iter().copied().map(Some).collect())
    }
}

impl From<Vec<f64>> for JointCommand {
    fn from(values: Vec<f64>) -> Self {
        Self::from(values.as_slice())
    }
}

impl<const N: usize> From<[f64; N]> for JointCommand {
    fn from(values: [f64; N]) -> Self {
        Self::from(values.as_slice())
    }
}

impl From<&[Option<f64>]> for JointCommand {
    fn from(values: &[Option<f64>]) -> Self {
        Self(values.to_vec())
    }
}

impl From<Vec<Option<f64>>> for JointCommand {
    fn from(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }
}

/// A joint connecting a parent link to a child link.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    name: String,
    joint_type: JointType,
    axis: Vector3<f64>,
    limit: JointLimit,
    ignore_limits: bool,
    value: Vec<f64>,
    origin: Option<Transform>,
    mimic: Option<Mimic>,
    parent: LinkId,
    child: LinkId,
    node: NodeId,
}

impl Joint {
    pub(crate) fn new(
        name: impl Into<String>,
        joint_type: JointType,
        parent: LinkId,
        child: LinkId,
        node: NodeId,
    ) -> Self {
        Self {
            name: name.into(),
            joint_type,
            axis: Vector3::x(),
            limit: JointLimit::default(),
            ignore_limits: false,
            value: vec![0.0; joint_type.dof()],
            origin: None,
            mimic: None,
            parent,
            child,
            node,
        }
    }

    pub(crate) fn with_axis(mut self, axis: Vector3<f64>) -> Self {
        self.axis = axis;
        self
    }

    pub(crate) fn with_limit(mut self, limit: JointLimit) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn set_mimic(&mut self, mimic: Mimic) {
        self.mimic = Some(mimic);
    }

    /// Joint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Joint type.
    #[must_use]
    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    /// Change the joint type and write the resulting pose into `transform`.
    ///
    /// The value vector resets to the new type's zeros, so the pose returns
    /// to the captured origin. Returns whether the type changed.
    pub(crate) fn set_joint_type(
        &mut self,
        joint_type: JointType,
        transform: &mut Transform,
    ) -> bool {
        if self.joint_type == joint_type {
            return false;
        }
        self.joint_type = joint_type;
        self.value = vec![0.0; joint_type.dof()];
        if let Some(origin) = self.origin {
            *transform = origin;
        }
        true
    }

    /// Unit axis in the joint frame.
    #[must_use]
    pub fn axis(&self) -> &Vector3<f64> {
        &self.axis
    }

    /// Position limits.
    #[must_use]
    pub fn limit(&self) -> &JointLimit {
        &self.limit
    }

    /// Replace the position limits. The current value is not re-clamped.
    pub fn set_limit(&mut self, limit: JointLimit) {
        self.limit = limit;
    }

    /// Whether limits are ignored when setting values.
    #[must_use]
    pub fn ignore_limits(&self) -> bool {
        self.ignore_limits
    }

    /// Enable or disable limit clamping.
    pub fn set_ignore_limits(&mut self, ignore: bool) {
        self.ignore_limits = ignore;
    }

    /// Current value vector.
    #[must_use]
    pub fn value(&self) -> &[f64] {
        &self.value
    }

    /// First value component: the angle of a revolute joint, the offset of a
    /// prismatic one.
    #[must_use]
    pub fn angle(&self) -> Option<f64> {
        self.value.first().copied()
    }

    /// Pose captured on the first value update, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&Transform> {
        self.origin.as_ref()
    }

    /// Mimic relation, if this joint follows another.
    #[must_use]
    pub fn mimic(&self) -> Option<Mimic> {
        self.mimic
    }

    /// Whether this joint follows another joint.
    #[must_use]
    pub fn is_mimic(&self) -> bool {
        self.mimic.is_some()
    }

    /// Parent link.
    #[must_use]
    pub fn parent(&self) -> LinkId {
        self.parent
    }

    /// Child link.
    #[must_use]
    pub fn child(&self) -> LinkId {
        self.child
    }

    /// Scene node carrying this joint's transform.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    fn limited(&self, value: f64) -> f64 {
        if self.joint_type.is_limited() && !self.ignore_limits {
            self.limit.clamp(value)
        } else {
            value
        }
    }

    /// Apply `command` and write the resulting pose into `transform`.
    ///
    /// The first call captures `transform` as the origin reference. Returns
    /// whether the stored value vector changed.
    pub fn set_value(&mut self, command: &JointCommand, transform: &mut Transform) -> bool {
        let origin = *self.origin.get_or_insert(*transform);

        match self.joint_type {
            JointType::Fixed => false,
            JointType::Continuous | JointType::Revolute => {
                let Some(requested) = command.get(0) else {
                    return false;
                };
                let angle = self.limited(requested);
                transform.rotation =
                    origin.rotation * UnitQuaternion::from_scaled_axis(self.axis * angle);
                self.store(0, angle)
            }
            JointType::Prismatic => {
                let Some(requested) = command.get(0) else {
                    return false;
                };
                let offset = self.limited(requested);
                // The axis is carried along by the captured origin orientation.
                transform.position = origin.position + origin.rotation * (self.axis * offset);
                self.store(0, offset)
            }
            JointType::Planar | JointType::Floating => {
                tracing::warn!(
                    "Joint '{}': '{}' joints are not supported, value stored without moving",
                    self.name,
                    self.joint_type
                );
                let mut changed = false;
                for i in 0..self.value.len() {
                    if let Some(v) = command.get(i) {
                        changed |= self.store(i, v);
                    }
                }
                changed
            }
        }
    }

    /// Store `value` in slot `i`, reporting whether it differs.
    fn store(&mut self, i: usize, value: f64) -> bool {
        // NaN never compares equal, so it always counts as a change.
        let changed = self.value[i] != value;
        self.value[i] = value;
        changed
    }
}
