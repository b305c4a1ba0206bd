//! Material descriptors and the named material registry.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, UrdfError};
use crate::package::{PackageSpec, resolve_path};
use crate::types::UrdfMaterial;

/// A resolved material.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Material name, if it had one.
    pub name: Option<String>,
    /// Linear RGB color.
    pub color: [f64; 3],
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// True iff `opacity < 1`.
    pub transparent: bool,
    /// Resolved texture path. Loading it is left to the renderer.
    pub texture: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            color: [1.0, 1.0, 1.0],
            opacity: 1.0,
            transparent: false,
            texture: None,
        }
    }
}

impl Material {
    /// Build a material from its parsed description.
    ///
    /// A texture that cannot be resolved is dropped with a warning.
    #[must_use]
    pub fn from_description(desc: &UrdfMaterial, packages: &PackageSpec, working_path: &str) -> Self {
        let mut material = Self {
            name: desc.name.clone(),
            ..Self::default()
        };

        if let Some([r, g, b, a]) = desc.rgba {
            material.color = [r, g, b];
            material.opacity = a;
            material.transparent = a < 1.0;
        }

        if let Some(ref filename) = desc.texture {
            match resolve_path(filename, packages, working_path) {
                Ok(path) => material.texture = Some(path),
                Err(e) => tracing::warn!("Dropping texture '{}': {}", filename, e),
            }
        }

        material
    }
}

/// How a visual's reference to an undefined material name is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaterialPolicy {
    /// Log a warning and use the default material.
    #[default]
    Fallback,
    /// Fail the parse with [`UrdfError::UnknownMaterial`].
    Strict,
}

/// Named materials declared at the top level of a robot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialRegistry {
    materials: HashMap<String, Material>,
}

impl MaterialRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named material, replacing any earlier definition.
    /// Unnamed materials are ignored.
    pub fn register(&mut self, material: Material) {
        let Some(name) = material.name.clone() else {
            tracing::warn!("Ignoring top-level material without a name");
            return;
        };
        self.materials.insert(name, material);
    }

    /// Look up a material by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    /// Number of registered materials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Whether no materials are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Resolve a material reference on a visual element.
    ///
    /// A registered name wins; otherwise inline color/texture data is used.
    /// A bare name that was never registered is handled per `policy`.
    pub fn resolve(
        &self,
        reference: &UrdfMaterial,
        policy: MaterialPolicy,
        packages: &PackageSpec,
        working_path: &str,
    ) -> Result<Material> {
        if let Some(found) = reference.name.as_deref().and_then(|n| self.get(n)) {
            return Ok(found.clone());
        }

        if reference.is_inline() {
            return Ok(Material::from_description(reference, packages, working_path));
        }

        match (&reference.name, policy) {
            (Some(name), MaterialPolicy::Strict) => Err(UrdfError::UnknownMaterial(name.clone())),
            (Some(name), MaterialPolicy::Fallback) => {
                tracing::warn!("Material '{}' is not defined, using default material", name);
                Ok(Material::default())
            }
            (None, _) => Ok(Material::default()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn named(name: &str) -> UrdfMaterial {
        UrdfMaterial {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_color_and_transparency() {
        let desc = UrdfMaterial {
            name: Some("glass".into()),
            rgba: Some([0.2, 0.4, 0.6, 0.5]),
            texture: None,
        };
        let m = Material::from_description(&desc, &PackageSpec::default(), "");
        assert_relative_eq!(m.color[1], 0.4);
        assert_relative_eq!(m.opacity, 0.5);
        assert!(m.transparent);

        let opaque = UrdfMaterial {
            rgba: Some([1.0, 0.0, 0.0, 1.0]),
            ..named("red")
        };
        let m = Material::from_description(&opaque, &PackageSpec::default(), "");
        assert!(!m.transparent);
    }

    #[test]
    fn test_texture_resolution() {
        let packages = PackageSpec::map([("skins", "/tex")]);
        let desc = UrdfMaterial {
            texture: Some("package://skins/wood.png".into()),
            ..named("wood")
        };
        let m = Material::from_description(&desc, &packages, "");
        assert_eq!(m.texture.as_deref(), Some("/tex/wood.png"));

        let missing = UrdfMaterial {
            texture: Some("package://nope/wood.png".into()),
            ..named("wood")
        };
        let m = Material::from_description(&missing, &packages, "");
        assert!(m.texture.is_none());
    }

    #[test]
    fn test_resolve_by_name() {
        let mut registry = MaterialRegistry::new();
        registry.register(Material {
            name: Some("blue".into()),
            color: [0.0, 0.0, 1.0],
            ..Default::default()
        });

        let m = registry
            .resolve(&named("blue"), MaterialPolicy::Strict, &PackageSpec::default(), "")
            .unwrap();
        assert_eq!(m.color, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_resolve_inline_not_registered() {
        let registry = MaterialRegistry::new();
        let inline = UrdfMaterial {
            name: Some("local".into()),
            rgba: Some([0.1, 0.2, 0.3, 1.0]),
            texture: None,
        };
        let m = registry
            .resolve(&inline, MaterialPolicy::Strict, &PackageSpec::default(), "")
            .unwrap();
        assert_eq!(m.color, [0.1, 0.2, 0.3]);
        assert!(registry.get("local").is_none());
    }

    #[test]
    fn test_resolve_unknown_name_policy() {
        let registry = MaterialRegistry::new();
        let packages = PackageSpec::default();

        let m = registry
            .resolve(&named("ghost"), MaterialPolicy::Fallback, &packages, "")
            .unwrap();
        assert_eq!(m, Material::default());

        let err = registry
            .resolve(&named("ghost"), MaterialPolicy::Strict, &packages, "")
            .unwrap_err();
        assert!(matches!(err, UrdfError::UnknownMaterial(ref n) if n == "ghost"));
    }
}
