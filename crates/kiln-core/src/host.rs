//! The output host collaborator.
//!
//! The host is the surrounding application: it turns raw generated geometry
//! into renderable meshes, collider shapes, terrain tiles, curves, and
//! spawned instances, and hands back opaque [`HostHandle`]s. The core only
//! decides *when* to create, update, or release those resources.

use serde::{Deserialize, Serialize};

use crate::id::{HostHandle, MaterialKey};
use crate::session::Transform;

/// Errors reported by the output host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("host failed to realize {kind}: {reason}")]
    Realize { kind: &'static str, reason: String },
    #[error("unknown instance source {0:?}")]
    UnknownSource(InstanceSource),
    #[error("unknown host handle {0:?}")]
    UnknownHandle(HostHandle),
}

/// A host resource handed back for release or bake. The variant tells the
/// host which subsystem owns the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Collider(HostHandle),
    Mesh(HostHandle),
    Volume(HostHandle),
    Curve(HostHandle),
    Instance(HostHandle),
    Material(HostHandle),
}

impl Resource {
    pub fn handle(self) -> HostHandle {
        match self {
            Resource::Collider(h)
            | Resource::Mesh(h)
            | Resource::Volume(h)
            | Resource::Curve(h)
            | Resource::Instance(h)
            | Resource::Material(h) => h,
        }
    }
}

/// Where the objects spawned by an instancer come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceSource {
    /// Another object generated by the same asset, by name.
    Object(String),
    /// A project asset path.
    Asset(String),
}

impl InstanceSource {
    /// Parse an instance attribute value. Values of the form `op:<name>`
    /// refer to an object of the same asset, anything else is a project path.
    pub fn parse(value: &str) -> Self {
        match value.strip_prefix("op:") {
            Some(name) => InstanceSource::Object(name.to_string()),
            None => InstanceSource::Asset(value.to_string()),
        }
    }
}

/// Mesh data for one level of detail.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub name: String,
    pub lod: u32,
    pub points: Vec<[f32; 3]>,
    /// Material handles, one per material slot.
    pub materials: Vec<HostHandle>,
}

/// One volume layer on one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    pub name: String,
    pub tile: i32,
    pub layer: String,
    pub samples: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurveGeometry {
    pub name: String,
    pub points: Vec<[f32; 3]>,
    pub closed: bool,
}

/// A user customization of a single spawned instance slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOverride {
    /// Point index within the instancer this override targets.
    pub slot: usize,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub material: Option<MaterialKey>,
    #[serde(default)]
    pub offset: Option<Transform>,
}

impl InstanceOverride {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            hidden: false,
            material: None,
            offset: None,
        }
    }
}

/// The application side of output realization.
///
/// `realize_*` calls receive the handle of the previous realization when one
/// exists so the host can update it in place; they return the handle that
/// is live afterwards (which may be the same).
pub trait OutputHost {
    fn realize_mesh(
        &mut self,
        existing: Option<HostHandle>,
        geometry: &MeshGeometry,
    ) -> Result<HostHandle, HostError>;

    /// Build a collider attached to `mesh` from the collision points of a
    /// part.
    fn realize_collider(
        &mut self,
        mesh: HostHandle,
        points: &[[f32; 3]],
    ) -> Result<HostHandle, HostError>;

    fn realize_volume(
        &mut self,
        existing: Option<HostHandle>,
        volume: &VolumeGeometry,
    ) -> Result<HostHandle, HostError>;

    fn realize_curve(
        &mut self,
        existing: Option<HostHandle>,
        curve: &CurveGeometry,
    ) -> Result<HostHandle, HostError>;

    fn spawn_instance(
        &mut self,
        source: &InstanceSource,
        transform: &Transform,
    ) -> Result<HostHandle, HostError>;

    fn apply_instance_override(
        &mut self,
        instance: HostHandle,
        applied: &InstanceOverride,
    ) -> Result<(), HostError>;

    /// Move a realized mesh, volume, or curve to its object's transform.
    /// Called for fresh handles and whenever the object moves.
    fn place(&mut self, resource: Resource, transform: &Transform) -> Result<(), HostError>;

    fn create_material(&mut self, key: &MaterialKey) -> Result<HostHandle, HostError>;

    /// Produce a standalone copy of `resource` that is no longer managed by
    /// the core.
    fn bake(&mut self, resource: Resource) -> Result<HostHandle, HostError>;

    fn release(&mut self, resource: Resource);
}
