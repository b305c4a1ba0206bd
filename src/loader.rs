//! Loader configuration and entry points.
//!
//! [`UrdfLoader`] parses a document, compiles it into a [`Robot`], and hands
//! mesh requests to the configured [`MeshLoader`]. Every successful load
//! starts a new generation; mesh results tagged with an older generation are
//! discarded when they arrive.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::builder::build_robot;
use crate::error::Result;
use crate::geometry::{MeshLoader, MeshResponse};
use crate::material::MaterialPolicy;
use crate::package::PackageSpec;
use crate::parser::parse_urdf_str;
use crate::robot::Robot;
use crate::types::UrdfRobot;

/// Options for turning a URDF document into a robot.
#[derive(Clone)]
pub struct LoaderOptions {
    /// How `package://` URIs are resolved (default: empty root).
    pub packages: PackageSpec,
    /// Prefix for relative mesh and texture paths (default: empty).
    pub working_path: String,
    /// Build visual elements (default: true).
    pub parse_visual: bool,
    /// Build collision elements (default: false).
    pub parse_collision: bool,
    /// Handling of undefined material names (default: fallback).
    pub material_policy: MaterialPolicy,
    /// Mesh loading callback. Without one, mesh geometry is skipped.
    pub mesh_loader: Option<Arc<dyn MeshLoader>>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            packages: PackageSpec::default(),
            working_path: String::new(),
            parse_visual: true,
            parse_collision: false,
            material_policy: MaterialPolicy::default(),
            mesh_loader: None,
        }
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("packages", &self.packages)
            .field("working_path", &self.working_path)
            .field("parse_visual", &self.parse_visual)
            .field("parse_collision", &self.parse_collision)
            .field("material_policy", &self.material_policy)
            .field("mesh_loader", &self.mesh_loader.is_some())
            .finish()
    }
}

impl LoaderOptions {
    /// Set the package resolution strategy.
    #[must_use]
    pub fn with_packages(mut self, packages: impl Into<PackageSpec>) -> Self {
        self.packages = packages.into();
        self
    }

    /// Set the working path prefix for relative filenames.
    #[must_use]
    pub fn with_working_path(mut self, working_path: impl Into<String>) -> Self {
        self.working_path = working_path.into();
        self
    }

    /// Set whether visual elements are built.
    #[must_use]
    pub fn with_visuals(mut self, parse: bool) -> Self {
        self.parse_visual = parse;
        self
    }

    /// Set whether collision elements are built.
    #[must_use]
    pub fn with_collisions(mut self, parse: bool) -> Self {
        self.parse_collision = parse;
        self
    }

    /// Set the undefined-material policy.
    #[must_use]
    pub fn with_material_policy(mut self, policy: MaterialPolicy) -> Self {
        self.material_policy = policy;
        self
    }

    /// Set the mesh loading callback.
    #[must_use]
    pub fn with_mesh_loader(mut self, loader: impl MeshLoader + 'static) -> Self {
        self.mesh_loader = Some(Arc::new(loader));
        self
    }
}

/// URDF loader with configuration options.
///
/// Each successful load starts a new generation and supersedes the robots
/// of earlier loads: their pending mesh results are discarded. A load that
/// fails, whether while parsing or while building, leaves the generation
/// unchanged, so the previous robot keeps receiving its meshes.
#[derive(Debug)]
pub struct UrdfLoader {
    options: LoaderOptions,
    generation: u64,
    sender: Sender<MeshResponse>,
    receiver: Receiver<MeshResponse>,
    /// Current-generation responses that belong to another robot instance.
    held: Vec<MeshResponse>,
}

impl Default for UrdfLoader {
    fn default() -> Self {
        Self::with_options(LoaderOptions::default())
    }
}

impl UrdfLoader {
    /// Create a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader with the given options.
    #[must_use]
    pub fn with_options(options: LoaderOptions) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            options,
            generation: 0,
            sender,
            receiver,
            held: Vec::new(),
        }
    }

    /// Set the mesh loading callback.
    #[must_use]
    pub fn with_mesh_loader(mut self, loader: impl MeshLoader + 'static) -> Self {
        self.options.mesh_loader = Some(Arc::new(loader));
        self
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Mutable options, applied to the next load.
    pub fn options_mut(&mut self) -> &mut LoaderOptions {
        &mut self.options
    }

    /// Generation of the most recent successful load. Zero before the
    /// first one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Load URDF from a file path.
    ///
    /// An empty working path defaults to the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Robot> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let description = parse_urdf_str(&content)?;

        if !self.options.working_path.is_empty() {
            return self.load_description(&description);
        }

        let working_path = path
            .parent()
            .map(|dir| dir.to_string_lossy().into_owned())
            .filter(|dir| !dir.is_empty())
            .map(|dir| format!("{}/", dir.trim_end_matches('/')))
            .unwrap_or_default();
        let options = LoaderOptions {
            working_path,
            ..self.options.clone()
        };
        self.build(&description, &options)
    }

    /// Load URDF from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or construction fails.
    pub fn load_str(&mut self, xml: &str) -> Result<Robot> {
        let description = parse_urdf_str(xml)?;
        self.load_description(&description)
    }

    /// Build a robot from an already parsed description.
    ///
    /// # Errors
    ///
    /// Returns an error on undefined links, duplicate names, loops, or mimic
    /// cycles.
    pub fn load_description(&mut self, description: &UrdfRobot) -> Result<Robot> {
        let options = self.options.clone();
        self.build(description, &options)
    }

    fn build(&mut self, description: &UrdfRobot, options: &LoaderOptions) -> Result<Robot> {
        // A failed build dispatches no requests, so the next generation can
        // be claimed only once the robot exists.
        let generation = self.generation + 1;
        let mut robot = build_robot(description, options, generation, &self.sender)?;
        self.generation = generation;
        self.attach_loaded_meshes(&mut robot);
        Ok(robot)
    }

    /// Attach every mesh that has completed for `robot`.
    ///
    /// Results from superseded loads are disposed. Returns the number of
    /// meshes attached.
    pub fn attach_loaded_meshes(&mut self, robot: &mut Robot) -> usize {
        self.held.extend(self.receiver.try_iter());

        let mut attached = 0;
        let mut keep = Vec::new();
        for response in self.held.drain(..) {
            let generation = response.ticket.generation;
            if generation < self.generation {
                tracing::debug!(
                    "Discarding mesh result from superseded load (generation {})",
                    generation
                );
            } else if generation == robot.generation() {
                if robot.resolve_mesh(response) {
                    attached += 1;
                }
            } else {
                keep.push(response);
            }
        }
        self.held = keep;

        attached
    }
}

/// Load a URDF file with default settings.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_urdf_file(path: impl AsRef<Path>) -> Result<Robot> {
    UrdfLoader::new().load_file(path)
}

/// Load a URDF string with default settings.
///
/// # Errors
///
/// Returns an error if parsing or construction fails.
pub fn load_urdf_str(xml: &str) -> Result<Robot> {
    UrdfLoader::new().load_str(xml)
}
