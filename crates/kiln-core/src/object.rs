use crate::id::{GeoKey, SessionNodeId};
use crate::session::{DescriptorKind, NodeDescriptor, Transform};

/// A named group of geos sharing one transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub(crate) session_id: SessionNodeId,
    name: String,
    transform: Transform,
    is_instancer: bool,
    /// Instanced by another object; its own output stays hidden.
    is_instanced: bool,
    is_visible: bool,
    pub(crate) geos: Vec<GeoKey>,
}

impl ObjectNode {
    pub fn new(descriptor: &NodeDescriptor) -> Self {
        let mut object = Self {
            session_id: SessionNodeId::INVALID,
            name: String::new(),
            transform: Transform::IDENTITY,
            is_instancer: false,
            is_instanced: false,
            is_visible: true,
            geos: Vec::new(),
        };
        object.rebind(descriptor);
        object
    }

    /// Take over identity and live data from a fresh descriptor. The record
    /// itself, and everything attached to it, stays put. Returns whether the
    /// transform moved.
    pub(crate) fn rebind(&mut self, descriptor: &NodeDescriptor) -> bool {
        let mut moved = false;
        self.session_id = descriptor.id;
        self.name.clone_from(&descriptor.name);
        if let DescriptorKind::Object {
            transform,
            is_instancer,
            is_instanced,
            is_visible,
        } = descriptor.kind
        {
            moved = self.transform != transform;
            self.transform = transform;
            self.is_instancer = is_instancer;
            self.is_instanced = is_instanced;
            self.is_visible = is_visible;
        }
        moved
    }

    pub fn session_id(&self) -> SessionNodeId {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn is_instancer(&self) -> bool {
        self.is_instancer
    }

    pub fn is_instanced(&self) -> bool {
        self.is_instanced
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn geos(&self) -> &[GeoKey] {
        &self.geos
    }
}
