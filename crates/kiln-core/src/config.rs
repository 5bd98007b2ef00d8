//! Asset definitions and per-asset cook configuration.
//!
//! Both types are plain serde data so hosts can keep them in RON, TOML, or
//! JSON files (see the `kiln-data` crate). Every config field has a default,
//! so a partial file only overrides what it names.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What kind of root node an asset creates in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AssetType {
    /// A node instantiated from a procedural asset library.
    #[default]
    Procedural,
    /// A bare editable curve node.
    Curve,
    /// A node that only marshals input geometry into the session.
    InputOnly,
}

impl AssetType {
    /// Session node type created for non-library assets.
    pub fn builtin_node_type(self) -> Option<&'static str> {
        match self {
            AssetType::Procedural => None,
            AssetType::Curve => Some("sop/curve"),
            AssetType::InputOnly => Some("sop/input"),
        }
    }
}

/// Where an asset comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDefinition {
    /// Display name of the asset instance.
    pub name: String,
    #[serde(default)]
    pub asset_type: AssetType,
    /// Library to load for [`AssetType::Procedural`].
    #[serde(default)]
    pub library: Option<PathBuf>,
    /// Asset type name to instantiate when the library defines several.
    #[serde(default)]
    pub selected_asset: Option<String>,
}

impl AssetDefinition {
    pub fn procedural(name: impl Into<String>, library: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            asset_type: AssetType::Procedural,
            library: Some(library.into()),
            selected_asset: None,
        }
    }

    pub fn curve(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asset_type: AssetType::Curve,
            library: None,
            selected_asset: None,
        }
    }

    pub fn with_selection(mut self, asset: impl Into<String>) -> Self {
        self.selected_asset = Some(asset.into());
        self
    }
}

/// Tunables for cooking and reconciling one asset.
/// Events of each kind an asset queues by default.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Extra cook cycles a deferred preset fragment is retried before it is
    /// dropped.
    pub deferred_preset_retries: u32,
    /// Build colliders from collision-flagged points.
    pub generate_colliders: bool,
    /// Split meshes into one unit per level of detail.
    pub split_lods: bool,
    /// Upload the asset transform before each recook.
    pub sync_transform: bool,
    /// Skip a recook when no parameter, input, or transform changed.
    pub check_params_changed: bool,
    /// Events of each kind kept for [`drain`](crate::event::AssetEventBus::drain)
    /// before the oldest are dropped.
    pub event_capacity: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            deferred_preset_retries: 1,
            generate_colliders: true,
            split_lods: true,
            sync_transform: true,
            check_params_changed: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_retries_one_extra_cycle() {
        assert_eq!(AssetConfig::default().deferred_preset_retries, 1);
    }

    #[test]
    fn builtin_types() {
        assert_eq!(AssetType::Procedural.builtin_node_type(), None);
        assert_eq!(AssetType::Curve.builtin_node_type(), Some("sop/curve"));
        assert_eq!(AssetType::InputOnly.builtin_node_type(), Some("sop/input"));
    }

    #[test]
    fn definition_builders() {
        let def = AssetDefinition::procedural("rocks", "libs/rocks.hda").with_selection("Rock::2.0");
        assert_eq!(def.asset_type, AssetType::Procedural);
        assert_eq!(def.selected_asset.as_deref(), Some("Rock::2.0"));
        assert!(AssetDefinition::curve("path").library.is_none());
    }
}
