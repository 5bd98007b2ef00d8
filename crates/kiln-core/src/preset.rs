//! Identity-independent snapshots of everything a user tuned on an asset.
//!
//! A [`PresetStore`] never mentions session handles or record keys. Curves
//! are keyed by curve name, inputs by input name, and volume layer stacks
//! by owning object name + geo name + tile, so a store captured in one
//! session applies to a fresh rebuild in another.
//!
//! Applying a store is two-phase. Parameters and curves go in right away.
//! Input and volume-layer fragments whose named target does not exist yet
//! are parked as [`DeferredPreset`]s and retried after later cooks, up to a
//! fixed number of extra cycles.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AssetType;
use crate::geo::{CurveData, VolumeLayerSettings};
use crate::scene::SceneGraph;
use crate::serialize::{
    PresetDecodeError, PresetEncodeError, decode_preset, encode_preset, from_bytes, to_bytes,
};
use crate::session::ObjectRef;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// One editable curve, stored as an encoded [`CurveData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePreset {
    pub name: String,
    pub blob: Vec<u8>,
}

impl CurvePreset {
    pub fn new(name: impl Into<String>, data: &CurveData) -> Result<Self, PresetEncodeError> {
        Ok(Self {
            name: name.into(),
            blob: to_bytes(data)?,
        })
    }

    pub fn data(&self) -> Result<CurveData, PresetDecodeError> {
        from_bytes(&self.blob)
    }
}

/// The objects connected to one named asset input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPreset {
    pub input_name: String,
    pub sources: Vec<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPreset {
    pub name: String,
    pub settings: VolumeLayerSettings,
}

/// Layer settings of one volume tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeLayerPreset {
    pub object_name: String,
    pub geo_name: String,
    pub tile: i32,
    pub layers: Vec<LayerPreset>,
}

/// Snapshot of the user-tunable state of one asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetStore {
    pub asset_name: String,
    /// Absent in stores written before the type tag existed.
    pub asset_type: Option<AssetType>,
    /// Opaque session parameter snapshot.
    pub parameters: Vec<u8>,
    pub curves: Vec<CurvePreset>,
    pub inputs: Vec<InputPreset>,
    pub volume_layers: Vec<VolumeLayerPreset>,
}

impl PresetStore {
    pub fn encode(&self) -> Result<Vec<u8>, PresetEncodeError> {
        encode_preset(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PresetDecodeError> {
        decode_preset(data)
    }

    /// Compare the store's target against an asset. A store without a type
    /// tag only mismatches on name.
    pub fn mismatch(&self, asset_name: &str, asset_type: AssetType) -> Option<PresetMismatch> {
        let type_differs = self.asset_type.is_some_and(|t| t != asset_type);
        if self.asset_name == asset_name && !type_differs {
            return None;
        }
        Some(PresetMismatch {
            expected_name: asset_name.to_string(),
            expected_type: asset_type,
            found_name: self.asset_name.clone(),
            found_type: self.asset_type,
        })
    }
}

/// A loaded store that targets a different asset. Reported to the caller,
/// who decides whether to apply it anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetMismatch {
    pub expected_name: String,
    pub expected_type: AssetType,
    pub found_name: String,
    pub found_type: Option<AssetType>,
}

// ---------------------------------------------------------------------------
// Deferral
// ---------------------------------------------------------------------------

/// A fragment that may need a later cook before its target exists.
#[derive(Debug, Clone, PartialEq)]
pub enum PresetFragment {
    Input(InputPreset),
    VolumeLayers(VolumeLayerPreset),
}

impl PresetFragment {
    pub fn target(&self) -> String {
        match self {
            PresetFragment::Input(p) => format!("input '{}'", p.input_name),
            PresetFragment::VolumeLayers(p) => {
                format!("volume {}/{} tile {}", p.object_name, p.geo_name, p.tile)
            }
        }
    }
}

/// A fragment waiting for its target, with the extra cycles it may still
/// wait.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredPreset {
    pub fragment: PresetFragment,
    pub retries_left: u32,
}

/// The deferred fragments of one asset.
#[derive(Debug, Clone, Default)]
pub struct DeferredPresets {
    entries: Vec<DeferredPreset>,
}

impl DeferredPresets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DeferredPreset] {
        &self.entries
    }

    pub fn push(&mut self, fragment: PresetFragment, retries: u32) {
        self.entries.push(DeferredPreset {
            fragment,
            retries_left: retries,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Try every entry once. `apply` returns `true` when the target existed.
    /// A failed try uses up one retry; entries out of retries are dropped
    /// with a warning. Returns the number
    /// of fragments applied.
    pub fn retry(&mut self, mut apply: impl FnMut(&PresetFragment) -> bool) -> usize {
        let mut applied = 0;
        self.entries.retain_mut(|entry| {
            if apply(&entry.fragment) {
                applied += 1;
                return false;
            }
            entry.retries_left = entry.retries_left.saturating_sub(1);
            if entry.retries_left == 0 {
                warn!(fragment = %entry.fragment.target(), "dropping stale preset fragment");
                return false;
            }
            true
        });
        applied
    }
}

// ---------------------------------------------------------------------------
// Scene capture / apply
// ---------------------------------------------------------------------------

/// One preset per editable curve in the scene.
pub(crate) fn capture_curves(scene: &SceneGraph) -> Result<Vec<CurvePreset>, PresetEncodeError> {
    let mut out = Vec::new();
    for (_, _, geo) in scene.geos_with_object() {
        if let Some(curve) = geo.curve().filter(|c| c.editable) {
            out.push(CurvePreset::new(curve.name.clone(), &curve.data)?);
        }
    }
    Ok(out)
}

pub(crate) fn capture_volume_layers(scene: &SceneGraph) -> Vec<VolumeLayerPreset> {
    let mut out = Vec::new();
    for (object, _, geo) in scene.geos_with_object() {
        for stack in geo.volume_layers() {
            out.push(VolumeLayerPreset {
                object_name: object.to_string(),
                geo_name: geo.name().to_string(),
                tile: stack.tile,
                layers: stack
                    .layers
                    .iter()
                    .map(|l| LayerPreset {
                        name: l.name.clone(),
                        settings: l.settings.clone(),
                    })
                    .collect(),
            });
        }
    }
    out
}

/// Write a curve preset into the curve of the same name. Returns `false`
/// when no such curve exists.
pub(crate) fn apply_curve(
    scene: &mut SceneGraph,
    preset: &CurvePreset,
) -> Result<bool, PresetDecodeError> {
    let target = scene
        .geos_with_object()
        .into_iter()
        .find(|(_, _, g)| g.curve().is_some_and(|c| c.name == preset.name))
        .map(|(_, key, _)| key);
    let Some(key) = target else {
        return Ok(false);
    };
    let data = preset.data()?;
    Ok(scene.geo_mut(key).is_some_and(|g| g.set_curve_data(data)))
}

/// Copy layer settings into the matching stack. Returns `false` when the
/// stack does not exist yet.
pub(crate) fn apply_volume_layers(scene: &mut SceneGraph, preset: &VolumeLayerPreset) -> bool {
    let Some(key) = scene.find_geo(&preset.object_name, &preset.geo_name) else {
        return false;
    };
    let Some(stack) = scene
        .geo_mut(key)
        .and_then(|g| g.volume_stack_mut(preset.tile))
    else {
        return false;
    };
    for layer in &preset.layers {
        if let Some(target) = stack.layer_mut(&layer.name) {
            target.settings = layer.settings.clone();
        }
    }
    true
}
