//! Scene node arena for the kinematic tree.
//!
//! Every link, joint, visual, collision, and renderable of a robot is a
//! [`SceneNode`] in a single [`SceneGraph`] owned by the robot. Nodes refer to
//! each other by [`NodeId`], so cloning a graph yields an independent tree
//! with the same shape.

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::geometry::{AssetId, PrimitiveShape};
use crate::material::Material;
use crate::robot::{CollisionId, JointId, LinkId, VisualId};

/// Index of a node inside a [`SceneGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Local transform of a scene node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation in the parent frame.
    pub position: Vector3<f64>,
    /// Orientation in the parent frame.
    pub rotation: UnitQuaternion<f64>,
    /// Per-axis scale, applied before rotation.
    pub scale: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Identity transform with unit scale.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }

    /// Transform with the given translation and rotation and unit scale.
    #[must_use]
    pub fn from_parts(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            rotation,
            scale: Vector3::repeat(1.0),
        }
    }

    /// Set the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: Vector3<f64>) -> Self {
        self.scale = scale;
        self
    }

    /// Homogeneous matrix `T * R * S`.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = self.rotation.to_homogeneous();
        for col in 0..3 {
            for row in 0..3 {
                m[(row, col)] *= self.scale[col];
            }
        }
        m[(0, 3)] = self.position.x;
        m[(1, 3)] = self.position.y;
        m[(2, 3)] = self.position.z;
        m
    }
}

/// What a scene node represents.
///
/// Consumers match on this exhaustively instead of probing ad hoc flags.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The robot root. Root-candidate links hang directly below it.
    Robot,
    /// A rigid body.
    Link(LinkId),
    /// A joint without a mimic relation.
    Joint(JointId),
    /// A joint whose value follows another joint.
    MimicJoint(JointId),
    /// A visual geometry carrier.
    Visual(VisualId),
    /// A collision geometry carrier.
    Collision(CollisionId),
    /// A unit primitive scaled to the URDF dimensions.
    Primitive {
        /// The unit shape.
        shape: PrimitiveShape,
        /// Resolved material (visuals only).
        material: Option<Material>,
    },
    /// A renderable produced by the external mesh loader.
    Mesh {
        /// Loader-defined asset handle.
        asset: AssetId,
        /// Resolved material (visuals only).
        material: Option<Material>,
    },
}

/// A node in the scene graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Optional node name.
    pub name: Option<String>,
    /// What this node represents.
    pub kind: NodeKind,
    /// Local transform relative to the parent.
    pub transform: Transform,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    /// Parent node, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in attachment order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena of scene nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a detached node and return its id.
    pub fn insert(&mut self, name: Option<String>, kind: NodeKind, transform: Transform) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            name,
            kind,
            transform,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    ///
    /// Returns `false` if either id is out of range or the attachment would
    /// make `child` its own ancestor.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            return false;
        }
        if self.ancestors(parent).any(|a| a == child) || parent == child {
            return false;
        }
        self.remove_child(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        true
    }

    /// Detach `child` from its parent. The node stays in the arena.
    pub fn remove_child(&mut self, child: NodeId) -> bool {
        let Some(parent) = self.nodes.get(child.0).and_then(|n| n.parent) else {
            return false;
        };
        self.nodes[parent.0].children.retain(|&c| c != child);
        self.nodes[child.0].parent = None;
        true
    }

    /// Iterate over the ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).and_then(|n| n.parent), move |p| {
            self.node(*p).and_then(|n| n.parent)
        })
    }

    /// World matrix of a node: the product of local matrices from the root
    /// down to the node.
    #[must_use]
    pub fn world_matrix(&self, id: NodeId) -> Option<Matrix4<f64>> {
        let node = self.node(id)?;
        let mut m = node.transform.to_matrix();
        for ancestor in self.ancestors(id) {
            m = self.nodes[ancestor.0].transform.to_matrix() * m;
        }
        Some(m)
    }
}
