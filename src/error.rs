//! Error types for URDF parsing and robot construction.

use thiserror::Error;

/// Errors that can occur while parsing a URDF document or building a robot.
///
/// Structural errors (missing `<robot>` root, unknown link references, mimic
/// cycles) abort the parse. Resolution errors such as [`UrdfError::MissingPackage`]
/// are created at the point of use, logged, and the affected geometry is dropped.
#[derive(Debug, Error)]
pub enum UrdfError {
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// The document has no `<robot>` root element.
    #[error("malformed URDF document: {0}")]
    MalformedDocument(String),

    /// Missing required element.
    #[error("missing required element: {element} in {context}")]
    MissingElement {
        /// The missing element name.
        element: &'static str,
        /// Where the element was expected.
        context: String,
    },

    /// Missing required attribute.
    #[error("missing required attribute: {attribute} on {element}")]
    MissingAttribute {
        /// The missing attribute name.
        attribute: &'static str,
        /// The element that should have the attribute.
        element: String,
    },

    /// Unknown joint type.
    #[error("unknown joint type: {0}")]
    UnknownJointType(String),

    /// Reference to undefined link.
    #[error("reference to undefined link: {link_name} in joint {joint_name}")]
    UndefinedLink {
        /// The link name that was referenced.
        link_name: String,
        /// The joint that referenced it.
        joint_name: String,
    },

    /// Duplicate link name.
    #[error("duplicate link name: {0}")]
    DuplicateLink(String),

    /// Duplicate joint name.
    #[error("duplicate joint name: {0}")]
    DuplicateJoint(String),

    /// A link has more than one parent joint, or joints close a loop.
    #[error("kinematic loop detected: {0}")]
    KinematicLoop(String),

    /// A `<mimic>` element names a joint that does not exist.
    #[error("joint {joint_name} mimics undefined joint {mimicked}")]
    UndefinedMimicJoint {
        /// The mimicking joint.
        joint_name: String,
        /// The driver name that could not be found.
        mimicked: String,
    },

    /// Mimic joints form a dependency cycle.
    #[error("mimic joint cycle detected: {}", .0.join(" -> "))]
    MimicCycle(Vec<String>),

    /// A `package://` URI names a package absent from the package map.
    #[error("package {package} not found in provided package list (uri: {uri})")]
    MissingPackage {
        /// The package token extracted from the URI.
        package: String,
        /// The full URI being resolved.
        uri: String,
    },

    /// A visual references a material name that was never defined.
    #[error("reference to undefined material: {0}")]
    UnknownMaterial(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UrdfError {
    /// Create a missing element error.
    pub fn missing_element(element: &'static str, context: impl Into<String>) -> Self {
        Self::MissingElement {
            element,
            context: context.into(),
        }
    }

    /// Create a missing attribute error.
    pub fn missing_attribute(attribute: &'static str, element: impl Into<String>) -> Self {
        Self::MissingAttribute {
            attribute,
            element: element.into(),
        }
    }

    /// Create an undefined link error.
    pub fn undefined_link(link_name: impl Into<String>, joint_name: impl Into<String>) -> Self {
        Self::UndefinedLink {
            link_name: link_name.into(),
            joint_name: joint_name.into(),
        }
    }

    /// Create an undefined mimic driver error.
    pub fn undefined_mimic(joint_name: impl Into<String>, mimicked: impl Into<String>) -> Self {
        Self::UndefinedMimicJoint {
            joint_name: joint_name.into(),
            mimicked: mimicked.into(),
        }
    }

    /// Create a missing package error.
    pub fn missing_package(package: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::MissingPackage {
            package: package.into(),
            uri: uri.into(),
        }
    }

    /// Whether this error aborts parsing.
    ///
    /// Resolution failures are recoverable: the builder logs them and omits
    /// the affected geometry or material.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MissingPackage { .. })
    }
}

/// Result type for URDF operations.
pub type Result<T> = std::result::Result<T, UrdfError>;
