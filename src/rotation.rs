//! Numeric tuple parsing and roll-pitch-yaw rotation helpers.
//!
//! URDF numbers are parsed permissively: a malformed token becomes `NaN`
//! and flows through unchanged instead of failing the document.

use nalgebra::{UnitQuaternion, Vector3};

use crate::scene::Transform;

/// Parse a single number, yielding `NaN` for malformed input.
#[must_use]
pub fn parse_number(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse a whitespace-separated triple such as `xyz="1 0 0.5"`.
///
/// Missing or blank input yields zeros. Tokens beyond the third are ignored
/// and absent tokens read as `NaN`.
#[must_use]
pub fn parse_tuple(text: Option<&str>) -> Vector3<f64> {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Vector3::zeros();
    };
    let mut tokens = text.split_whitespace().map(parse_number);
    let mut next = || tokens.next().unwrap_or(f64::NAN);
    let x = next();
    let y = next();
    let z = next();
    Vector3::new(x, y, z)
}

/// Rotation for a URDF `rpy` triple.
///
/// Yaw about Z, then pitch about Y, then roll about X, each about the fixed
/// parent axes: `R = Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[must_use]
pub fn rpy_to_quaternion(rpy: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z)
}

/// Apply an `rpy` rotation to a transform.
///
/// When `additive` is false the existing rotation is replaced. Otherwise the
/// new rotation is pre-multiplied onto the current orientation.
pub fn apply_rotation(transform: &mut Transform, rpy: &Vector3<f64>, additive: bool) {
    let q = rpy_to_quaternion(rpy);
    transform.rotation = if additive { q * transform.rotation } else { q };
}
