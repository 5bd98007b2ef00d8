use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an object record in an asset's object arena.
    pub struct ObjectKey;

    /// Identifies a geometry record in an asset's geo arena.
    pub struct GeoKey;

    /// Identifies a part record in an asset's part arena.
    pub struct PartKey;
}

/// A node handle scoped to the generation session. Negative values are
/// never handed out by a session and mean "not bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionNodeId(pub i32);

impl SessionNodeId {
    /// The unbound handle.
    pub const INVALID: SessionNodeId = SessionNodeId(-1);

    /// Whether this handle has ever been bound to a session node.
    pub fn is_bound(self) -> bool {
        self.0 >= 0
    }
}

impl Default for SessionNodeId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Identifies a part inside a geometry node. Only unique per geo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartId(pub i32);

/// A resource handle issued by the output host (mesh, collider, material,
/// spawned instance, ...). Opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostHandle(pub u64);

/// Key of a session-generated material, usually the material path the
/// generation graph assigned to a primitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialKey(pub String);

impl MaterialKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}
