//! Geometry records and the editable data that hangs off them: one curve
//! for curve containers, layered volume stacks for volume output.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::artifact::ArtifactKind;
use crate::id::{PartKey, SessionNodeId};
use crate::part::PartNode;
use crate::session::{DescriptorKind, GeoKind, NodeDescriptor};

// ---------------------------------------------------------------------------
// Curves
// ---------------------------------------------------------------------------

/// Parameter that carries a curve's control points on its session node.
pub const CURVE_COORDS_PARM: &str = "coords";
/// Parameter that carries a curve's closed flag.
pub const CURVE_CLOSED_PARM: &str = "close";

/// Control points and flags of an editable curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    pub points: Vec<[f32; 3]>,
    #[serde(default)]
    pub closed: bool,
}

/// The single curve of a curve-container geo.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvePart {
    pub name: String,
    pub data: CurveData,
    pub editable: bool,
    /// Local edits not yet uploaded to the session.
    pub(crate) dirty: bool,
}

impl CurvePart {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

// ---------------------------------------------------------------------------
// Volume layers
// ---------------------------------------------------------------------------

/// User-tunable settings of one volume layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeLayerSettings {
    pub texture: Option<String>,
    pub tile_size: [f32; 2],
    pub metallic: f32,
    pub smoothness: f32,
}

impl Default for VolumeLayerSettings {
    fn default() -> Self {
        Self {
            texture: None,
            tile_size: [1.0, 1.0],
            metallic: 0.0,
            smoothness: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeLayer {
    pub name: String,
    pub part: PartKey,
    pub settings: VolumeLayerSettings,
}

/// All layers generated for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeLayerStack {
    pub tile: i32,
    pub layers: Vec<VolumeLayer>,
}

impl VolumeLayerStack {
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut VolumeLayer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }
}

// ---------------------------------------------------------------------------
// GeoNode
// ---------------------------------------------------------------------------

/// A named collection of parts produced by one geometry node.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoNode {
    pub(crate) session_id: SessionNodeId,
    name: String,
    kind: GeoKind,
    pub(crate) parts: Vec<PartKey>,
    pub(crate) curve: Option<CurvePart>,
    pub(crate) volume_layers: Vec<VolumeLayerStack>,
}

impl GeoNode {
    pub fn new(descriptor: &NodeDescriptor) -> Self {
        let mut geo = Self {
            session_id: SessionNodeId::INVALID,
            name: String::new(),
            kind: GeoKind::Display,
            parts: Vec::new(),
            curve: None,
            volume_layers: Vec::new(),
        };
        geo.rebind(descriptor);
        geo
    }

    pub(crate) fn rebind(&mut self, descriptor: &NodeDescriptor) {
        self.session_id = descriptor.id;
        self.name.clone_from(&descriptor.name);
        if let DescriptorKind::Geo { kind } = descriptor.kind {
            self.kind = kind;
        }
    }

    pub fn session_id(&self) -> SessionNodeId {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GeoKind {
        self.kind
    }

    pub fn parts(&self) -> &[PartKey] {
        &self.parts
    }

    pub fn curve(&self) -> Option<&CurvePart> {
        self.curve.as_ref()
    }

    pub fn volume_layers(&self) -> &[VolumeLayerStack] {
        &self.volume_layers
    }

    pub fn volume_stack(&self, tile: i32) -> Option<&VolumeLayerStack> {
        self.volume_layers.iter().find(|s| s.tile == tile)
    }

    pub fn volume_stack_mut(&mut self, tile: i32) -> Option<&mut VolumeLayerStack> {
        self.volume_layers.iter_mut().find(|s| s.tile == tile)
    }

    /// Whether parts of this geo can be edited by the user.
    pub fn is_editable(&self) -> bool {
        matches!(self.kind, GeoKind::Editable | GeoKind::CurveContainer)
    }

    /// Replace the curve's points locally. Uploaded on the next recook.
    pub fn set_curve_data(&mut self, data: CurveData) -> bool {
        match &mut self.curve {
            Some(curve) => {
                curve.data = data;
                curve.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Rebuild the per-tile layer stacks from the current volume parts,
    /// keeping settings of layers whose tile and name survived.
    pub(crate) fn rebuild_volume_layers(&mut self, parts: &SlotMap<PartKey, PartNode>) {
        let previous = std::mem::take(&mut self.volume_layers);
        let mut stacks: Vec<VolumeLayerStack> = Vec::new();

        for key in &self.parts {
            let Some(part) = parts.get(*key) else {
                continue;
            };
            if part.artifact().kind() != ArtifactKind::Volume {
                continue;
            }
            let Some((tile, layer)) = part.artifact().volume_layer() else {
                continue;
            };
            let settings = previous
                .iter()
                .find(|s| s.tile == tile)
                .and_then(|s| s.layers.iter().find(|l| l.name == layer))
                .map(|l| l.settings.clone())
                .unwrap_or_default();
            let entry = VolumeLayer {
                name: layer.to_string(),
                part: *key,
                settings,
            };
            match stacks.iter_mut().find(|s| s.tile == tile) {
                Some(stack) => stack.layers.push(entry),
                None => stacks.push(VolumeLayerStack {
                    tile,
                    layers: vec![entry],
                }),
            }
        }

        stacks.sort_by_key(|s| s.tile);
        self.volume_layers = stacks;
    }
}
