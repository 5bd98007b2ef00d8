//! The generation session collaborator.
//!
//! The session is an external, stateful procedural engine addressed by
//! integer node handles. The core never sees its wire protocol; it talks to
//! it through the [`GenerationSession`] trait, one call per concern. A
//! single session is usually shared by every asset in the host, so assets
//! borrow it per call (see [`crate::asset::CookContext`]) instead of owning
//! it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::id::{PartId, SessionNodeId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors reported by a generation session call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session does not recognize node {0:?}")]
    InvalidNode(SessionNodeId),
    #[error("failed to load asset library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },
    #[error("unknown asset type '{0}'")]
    UnknownAssetType(String),
    #[error("input {index} out of range on node {node:?}")]
    InputOutOfRange { node: SessionNodeId, index: usize },
    #[error("session call {call} failed: {reason}")]
    Call { call: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Cook status and options
// ---------------------------------------------------------------------------

/// Result of polling the session while a cook is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookStatus {
    /// The cook has not finished yet.
    StillCooking,
    /// The cook finished cleanly.
    ReadySuccess,
    /// The cook finished but some nodes reported warnings or recoverable
    /// errors. A result exists and is reconciled.
    ReadyWithWarnings,
    /// The engine could not produce a result at all.
    FatalError,
}

impl CookStatus {
    /// Whether the session has left the "still cooking" range.
    pub fn is_finished(self) -> bool {
        !matches!(self, CookStatus::StillCooking)
    }
}

/// Options passed with every cook call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookOptions {
    /// Convert curves to polylines during the cook.
    pub refine_curves: bool,
    /// Also cook editable and intermediate (templated) geometry.
    pub cook_templated_geos: bool,
}

impl Default for CookOptions {
    fn default() -> Self {
        Self {
            refine_curves: true,
            cook_templated_geos: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Node descriptors
// ---------------------------------------------------------------------------

/// A rigid transform in host space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f32; 3],
    /// Rotation quaternion, `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// What a geometry node represents inside its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoKind {
    /// The displayed output of the object.
    Display,
    /// User-editable geometry exposed by the asset.
    Editable,
    /// Intermediate (templated) output, not displayed by default.
    Intermediate,
    /// Holds a single editable curve.
    CurveContainer,
    /// Holds geometry fed in through an asset input.
    InputContainer,
}

/// The realized output a part produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartOutputKind {
    Mesh,
    Volume,
    Curve,
    Instancer,
}

/// Level-specific information carried by a [`NodeDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorKind {
    Object {
        transform: Transform,
        is_instancer: bool,
        /// Instanced by another object and therefore not displayed itself.
        is_instanced: bool,
        is_visible: bool,
    },
    Geo {
        kind: GeoKind,
    },
    /// A part inside a geo. The descriptor's `id` is the owning geo node;
    /// the part itself is addressed by `part_id`.
    Part {
        part_id: PartId,
        output: PartOutputKind,
        is_instanced: bool,
        point_count: usize,
    },
}

/// One child entry returned by [`GenerationSession::child_nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub id: SessionNodeId,
    pub name: String,
    /// Set by the session when this node's output differs from the previous
    /// cook.
    pub changed: bool,
    pub kind: DescriptorKind,
}

// ---------------------------------------------------------------------------
// Attribute buffers and parameters
// ---------------------------------------------------------------------------

/// Well-known attribute names read during part regeneration.
pub mod attrib {
    /// Point positions, float tuple size 3.
    pub const POSITION: &str = "P";
    /// Per-point material path.
    pub const MATERIAL: &str = "material";
    /// Per-point level of detail index.
    pub const LOD: &str = "lod";
    /// Per-point collision flag (non-zero = collider geometry).
    pub const COLLISION: &str = "collision";
    /// Volume tile index (detail attribute, one value).
    pub const TILE: &str = "tile";
    /// Volume layer name (detail attribute, one value).
    pub const LAYER: &str = "layer";
    /// Per-point instance source reference.
    pub const INSTANCE: &str = "instance";
    /// Curve closed flag (detail attribute, one value).
    pub const CLOSED: &str = "closed";
}

/// A typed attribute buffer read from the session.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBuffer {
    Float { tuple_size: usize, data: Vec<f32> },
    Int { tuple_size: usize, data: Vec<i32> },
    Str(Vec<String>),
}

impl AttributeBuffer {
    /// Number of tuples in the buffer.
    pub fn len(&self) -> usize {
        match self {
            AttributeBuffer::Float { tuple_size, data } => data.len() / (*tuple_size).max(1),
            AttributeBuffer::Int { tuple_size, data } => data.len() / (*tuple_size).max(1),
            AttributeBuffer::Str(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpret a float buffer of tuple size 3 as points.
    pub fn as_vec3(&self) -> Option<Vec<[f32; 3]>> {
        match self {
            AttributeBuffer::Float {
                tuple_size: 3,
                data,
            } => Some(data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()),
            _ => None,
        }
    }

    /// First component of every tuple of an int buffer.
    pub fn as_ints(&self) -> Option<Vec<i32>> {
        match self {
            AttributeBuffer::Int { tuple_size, data } => {
                Some(data.iter().step_by((*tuple_size).max(1)).copied().collect())
            }
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            AttributeBuffer::Str(values) => Some(values),
            _ => None,
        }
    }
}

/// A parameter value on a session node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Str(Vec<String>),
    Toggle(bool),
}

/// Reference to an object outside the asset that feeds one of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub path: String,
    /// `true` for a path inside the open scene, `false` for a project
    /// asset path.
    pub is_scene_path: bool,
}

impl ObjectRef {
    pub fn scene(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_scene_path: true,
        }
    }

    pub fn project(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_scene_path: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationSession trait
// ---------------------------------------------------------------------------

/// The external procedural engine.
///
/// Implementations wrap whatever transport the engine uses. Every call is
/// synchronous from the core's point of view except cooking, which is
/// started with [`cook_node`](GenerationSession::cook_node) and observed
/// with [`poll_cook_status`](GenerationSession::poll_cook_status).
pub trait GenerationSession {
    /// Load an asset library and return the asset type names it defines.
    fn load_library(&mut self, path: &Path) -> Result<Vec<String>, SessionError>;

    /// Create a node of `type_name` under `parent` (or at the root).
    fn create_node(
        &mut self,
        parent: Option<SessionNodeId>,
        type_name: &str,
    ) -> Result<SessionNodeId, SessionError>;

    fn delete_node(&mut self, node: SessionNodeId) -> Result<(), SessionError>;

    /// Whether the session still recognizes `node`. Returns `false` after the
    /// session was restarted, even for handles it issued earlier.
    fn is_node_valid(&self, node: SessionNodeId) -> bool;

    /// Start cooking `node`. Returns `false` when the session refused the
    /// request.
    fn cook_node(&mut self, node: SessionNodeId, options: &CookOptions)
    -> Result<bool, SessionError>;

    fn poll_cook_status(&mut self) -> CookStatus;

    /// Human-readable messages from the last cook of `node`.
    fn cook_messages(&self, node: SessionNodeId) -> Vec<String> {
        let _ = node;
        Vec::new()
    }

    /// Children of `node`: objects under an asset, geos under an object,
    /// parts under a geo.
    fn child_nodes(&self, node: SessionNodeId) -> Result<Vec<NodeDescriptor>, SessionError>;

    /// Read one attribute of a part. `Ok(None)` if the attribute does not
    /// exist.
    fn attribute_buffer(
        &self,
        node: SessionNodeId,
        part: PartId,
        name: &str,
    ) -> Result<Option<AttributeBuffer>, SessionError>;

    fn set_parameter_value(
        &mut self,
        node: SessionNodeId,
        name: &str,
        value: &ParameterValue,
    ) -> Result<(), SessionError>;

    fn parameter_value(
        &self,
        node: SessionNodeId,
        name: &str,
    ) -> Result<Option<ParameterValue>, SessionError>;

    /// Reset every parameter of `node` to its definition default.
    fn revert_parameters(&mut self, node: SessionNodeId) -> Result<(), SessionError>;

    /// Opaque snapshot of every parameter value of `node`.
    fn parameter_preset(&self, node: SessionNodeId) -> Result<Vec<u8>, SessionError>;

    fn set_parameter_preset(&mut self, node: SessionNodeId, blob: &[u8])
    -> Result<(), SessionError>;

    /// Names of the inputs `node` exposes, in input-index order.
    fn input_names(&self, node: SessionNodeId) -> Result<Vec<String>, SessionError>;

    fn connect_input(
        &mut self,
        node: SessionNodeId,
        index: usize,
        sources: &[ObjectRef],
    ) -> Result<(), SessionError>;

    fn disconnect_input(&mut self, node: SessionNodeId, index: usize)
    -> Result<(), SessionError>;

    fn set_node_transform(
        &mut self,
        node: SessionNodeId,
        transform: &Transform,
    ) -> Result<(), SessionError>;
}
