//! Geometry construction for visual and collision elements.
//!
//! Boxes, spheres, and cylinders become unit primitives scaled to the URDF
//! dimensions and are placed immediately. Meshes are handed to an external
//! [`MeshLoader`] and attached once the loader reports completion through a
//! [`MeshCompletion`].

use std::fmt;
use std::sync::mpsc::Sender;

use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::scene::Transform;
use crate::types::UrdfGeometry;

/// Loader-defined handle for a loaded renderable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssetId(pub u64);

/// Unit primitive shapes.
///
/// The box is a unit cube, the sphere has unit radius, and the cylinder has
/// unit radius and unit length along its local Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PrimitiveShape {
    /// Unit cube.
    Box,
    /// Unit sphere.
    Sphere,
    /// Unit cylinder along local Y.
    Cylinder,
}

/// Unit primitive and its local transform for a URDF geometry.
///
/// Returns `None` for meshes.
#[must_use]
pub fn primitive_for(geometry: &UrdfGeometry) -> Option<(PrimitiveShape, Transform)> {
    match geometry {
        UrdfGeometry::Box { size } => Some((
            PrimitiveShape::Box,
            Transform::identity().with_scale(*size),
        )),
        UrdfGeometry::Sphere { radius } => Some((
            PrimitiveShape::Sphere,
            Transform::identity().with_scale(Vector3::repeat(*radius)),
        )),
        UrdfGeometry::Cylinder { radius, length } => {
            // Turn the unit cylinder's Y axis onto URDF's Z axis.
            let rotation = UnitQuaternion::from_axis_angle(
                &Vector3::x_axis(),
                std::f64::consts::FRAC_PI_2,
            );
            Some((
                PrimitiveShape::Cylinder,
                Transform::from_parts(Vector3::zeros(), rotation)
                    .with_scale(Vector3::new(*radius, *length, *radius)),
            ))
        }
        UrdfGeometry::Mesh { .. } => None,
    }
}

/// A renderable returned by a mesh loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedMesh {
    /// Loader-defined asset handle.
    pub asset: AssetId,
    /// The asset's own scale. The URDF `scale` attribute multiplies it.
    pub scale: Vector3<f64>,
}

impl LoadedMesh {
    /// A loaded asset with unit scale.
    #[must_use]
    pub fn new(asset: AssetId) -> Self {
        Self {
            asset,
            scale: Vector3::repeat(1.0),
        }
    }
}

/// A mesh that failed to load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load mesh '{path}': {message}")]
pub struct MeshLoadError {
    /// The resolved path that was requested.
    pub path: String,
    /// Loader-provided reason.
    pub message: String,
}

/// Identifies a mesh request across loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshTicket {
    /// Load generation the request belongs to.
    pub generation: u64,
    /// Index of the pending mesh within its robot.
    pub slot: usize,
}

/// A completed mesh request, routed back to the robot that issued it.
#[derive(Debug)]
pub struct MeshResponse {
    /// The request this answers.
    pub ticket: MeshTicket,
    /// Loaded renderable or error.
    pub result: Result<LoadedMesh, MeshLoadError>,
}

/// A request handed to a [`MeshLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRequest {
    /// Fully resolved path or URL.
    pub path: String,
    /// Lowercased file extension, if the path has one.
    pub extension: Option<String>,
}

/// One-shot completion handle for a mesh request.
///
/// Consuming `self` guarantees at most one completion per request. Dropping
/// the handle without completing leaves the geometry absent.
pub struct MeshCompletion {
    ticket: MeshTicket,
    path: String,
    sender: Sender<MeshResponse>,
}

impl fmt::Debug for MeshCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshCompletion")
            .field("ticket", &self.ticket)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl MeshCompletion {
    pub(crate) fn new(ticket: MeshTicket, path: String, sender: Sender<MeshResponse>) -> Self {
        Self {
            ticket,
            path,
            sender,
        }
    }

    /// Ticket of the request being completed.
    #[must_use]
    pub fn ticket(&self) -> MeshTicket {
        self.ticket
    }

    /// Report the outcome of the request.
    pub fn complete(self, result: Result<LoadedMesh, MeshLoadError>) {
        let response = MeshResponse {
            ticket: self.ticket,
            result,
        };
        if self.sender.send(response).is_err() {
            tracing::debug!("Mesh '{}' completed after its loader was dropped", self.path);
        }
    }

    /// Report a successfully loaded mesh.
    pub fn succeed(self, mesh: LoadedMesh) {
        self.complete(Ok(mesh));
    }

    /// Report a failure.
    pub fn fail(self, message: impl Into<String>) {
        let error = MeshLoadError {
            path: self.path.clone(),
            message: message.into(),
        };
        self.complete(Err(error));
    }
}

/// External mesh loading callback.
///
/// Implementations may complete synchronously inside `load_mesh` or keep the
/// completion and finish later.
pub trait MeshLoader {
    /// Start loading `request`; report the outcome through `completion`.
    fn load_mesh(&self, request: MeshRequest, completion: MeshCompletion);
}

impl<F> MeshLoader for F
where
    F: Fn(MeshRequest, MeshCompletion),
{
    fn load_mesh(&self, request: MeshRequest, completion: MeshCompletion) {
        self(request, completion);
    }
}

/// Local transform of a loaded mesh under its visual or collision node.
///
/// Position comes from the origin, rotation from the origin `rpy`, and the
/// asset's own scale is multiplied by the URDF scale.
#[must_use]
pub fn mesh_transform(
    xyz: &Vector3<f64>,
    rpy: &Vector3<f64>,
    urdf_scale: &Vector3<f64>,
    asset_scale: &Vector3<f64>,
) -> Transform {
    let mut transform = Transform::identity().with_scale(asset_scale.component_mul(urdf_scale));
    transform.position = *xyz;
    crate::rotation::apply_rotation(&mut transform, rpy, false);
    transform
}
