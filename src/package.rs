//! `package://` URI resolution.
//!
//! Mesh and texture filenames either name a path relative to the document's
//! working path or a `package://<name>/<relpath>` URI. Package URIs are
//! resolved against a [`PackageSpec`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, UrdfError};

const PACKAGE_PREFIX: &str = "package://";

/// Resolver callback mapping a package name to its directory.
pub type PackageResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How `package://` URIs are mapped to directories.
#[derive(Clone)]
pub enum PackageSpec {
    /// A single directory. If it ends with the package name it is that
    /// package's directory, otherwise it contains one folder per package.
    Root(String),
    /// Explicit package name to directory mapping.
    Map(HashMap<String, String>),
    /// Resolver invoked with the package name.
    Resolver(PackageResolver),
}

impl Default for PackageSpec {
    fn default() -> Self {
        Self::Root(String::new())
    }
}

impl fmt::Debug for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(root) => f.debug_tuple("Root").field(root).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<&str> for PackageSpec {
    fn from(root: &str) -> Self {
        Self::Root(root.to_string())
    }
}

impl From<String> for PackageSpec {
    fn from(root: String) -> Self {
        Self::Root(root)
    }
}

impl From<HashMap<String, String>> for PackageSpec {
    fn from(map: HashMap<String, String>) -> Self {
        Self::Map(map)
    }
}

impl PackageSpec {
    /// Build a map spec from name/directory pairs.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a resolver spec from a closure.
    pub fn resolver(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::Resolver(Arc::new(f))
    }

    /// Directory for `package`, or `None` if a map spec lacks it.
    fn package_dir(&self, package: &str) -> Option<String> {
        match self {
            Self::Root(root) => {
                let root = root.trim_end_matches('/');
                if root.ends_with(package) {
                    Some(root.to_string())
                } else {
                    Some(format!("{root}/{package}"))
                }
            }
            Self::Map(map) => map
                .get(package)
                .map(|dir| dir.trim_end_matches('/').to_string()),
            Self::Resolver(resolve) => Some(resolve(package).trim_end_matches('/').to_string()),
        }
    }
}

/// Resolve a mesh or texture filename.
///
/// Plain paths are appended verbatim to `working_path`. Package URIs are
/// resolved through `packages`; a package missing from a map spec yields
/// [`UrdfError::MissingPackage`].
pub fn resolve_path(filename: &str, packages: &PackageSpec, working_path: &str) -> Result<String> {
    let Some(rest) = filename.strip_prefix(PACKAGE_PREFIX) else {
        return Ok(format!("{working_path}{filename}"));
    };

    let (package, relative) = rest.split_once('/').unwrap_or((rest, ""));
    let dir = packages
        .package_dir(package)
        .ok_or_else(|| UrdfError::missing_package(package, filename))?;

    Ok(format!("{dir}/{relative}"))
}

/// Lowercased file extension of a resolved path, if any.
#[must_use]
pub fn extension_hint(path: &str) -> Option<String> {
    let file = path.rsplit('/').next().unwrap_or(path);
    let file = file.split(['?', '#']).next().unwrap_or(file);
    file.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}
