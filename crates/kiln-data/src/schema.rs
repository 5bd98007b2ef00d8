//! Serde data file structs for asset setup files.
//!
//! These structs define the on-disk format of asset definitions: which
//! library to load, initial parameter values, input connections, and the
//! placement transform. They are deserialized from RON, JSON, or TOML data
//! files and then converted into core types by the loader.

use serde::Deserialize;

use kiln_core::config::AssetType;
use kiln_core::session::{ObjectRef, ParameterValue};

// ===========================================================================
// Assets
// ===========================================================================

/// One asset instance in a data file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetData {
    pub name: String,
    #[serde(rename = "type", default)]
    pub asset_type: AssetTypeData,
    /// Library path, relative to the data file's directory unless absolute.
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub selected_asset: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterData>,
    #[serde(default)]
    pub inputs: Vec<InputData>,
    #[serde(default)]
    pub translation: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetTypeData {
    #[default]
    Procedural,
    Curve,
    InputOnly,
}

impl From<AssetTypeData> for AssetType {
    fn from(data: AssetTypeData) -> Self {
        match data {
            AssetTypeData::Procedural => AssetType::Procedural,
            AssetTypeData::Curve => AssetType::Curve,
            AssetTypeData::InputOnly => AssetType::InputOnly,
        }
    }
}

// ===========================================================================
// Parameters
// ===========================================================================

/// An initial parameter value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterData {
    pub name: String,
    pub value: ParameterValueData,
}

/// Tagged so that `[1, 2]` is never guessed to be floats or ints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterValueData {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Str(Vec<String>),
    Toggle(bool),
}

impl From<ParameterValueData> for ParameterValue {
    fn from(data: ParameterValueData) -> Self {
        match data {
            ParameterValueData::Int(v) => ParameterValue::Int(v),
            ParameterValueData::Float(v) => ParameterValue::Float(v),
            ParameterValueData::Str(v) => ParameterValue::Str(v),
            ParameterValueData::Toggle(v) => ParameterValue::Toggle(v),
        }
    }
}

// ===========================================================================
// Inputs
// ===========================================================================

/// Objects connected to one named asset input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputData {
    pub name: String,
    pub sources: Vec<SourceData>,
}

/// One input source. Paths point into the open scene unless `scene` is
/// false, in which case they name a project asset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceData {
    pub path: String,
    #[serde(default = "default_true")]
    pub scene: bool,
}

fn default_true() -> bool {
    true
}

impl From<&SourceData> for ObjectRef {
    fn from(data: &SourceData) -> Self {
        if data.scene {
            ObjectRef::scene(data.path.clone())
        } else {
            ObjectRef::project(data.path.clone())
        }
    }
}
