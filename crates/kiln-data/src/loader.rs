//! Loading pipeline: reads asset setup files and builds core definitions.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers, plus the two entry points used by hosts:
//! [`load_asset_setup`] for a directory describing one asset and
//! [`load_asset_manifest`] for a directory listing several.

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kiln_core::asset::AssetNode;
use kiln_core::config::{AssetConfig, AssetDefinition, AssetType};
use kiln_core::session::{ObjectRef, ParameterValue, Transform};
use tracing::debug;

use crate::schema::AssetData;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A procedural asset names no library.
    #[error("procedural asset '{asset}' in {file} names no library")]
    MissingLibrary { file: PathBuf, asset: String },

    /// A duplicate asset name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A persisted preset could not be decoded.
    #[error("preset {file} is unreadable: {source}")]
    Preset {
        file: PathBuf,
        source: kiln_core::serialize::PresetDecodeError,
    },

    #[error(transparent)]
    PresetEncode(#[from] kiln_core::serialize::PresetEncodeError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let extensions = ["ron", "toml", "json"];
    let mut found: Option<PathBuf> = None;

    for ext in &extensions {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(ref existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .get(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
                .clone();
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Asset setup
// ===========================================================================

/// Everything needed to create and prime one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSetup {
    pub definition: AssetDefinition,
    pub config: AssetConfig,
    pub parameters: Vec<(String, ParameterValue)>,
    pub inputs: Vec<(String, Vec<ObjectRef>)>,
    pub transform: Transform,
}

impl AssetSetup {
    /// Build an asset with the initial values cached. Nothing is uploaded
    /// until its first cook.
    pub fn instantiate(&self) -> AssetNode {
        let mut asset = AssetNode::new(self.definition.clone(), self.config.clone());
        for (name, value) in &self.parameters {
            asset.set_parameter(name, value.clone());
        }
        for (name, sources) in &self.inputs {
            asset.connect_input(name, sources.clone());
        }
        asset.set_transform(self.transform);
        asset
    }
}

/// Convert file data into a setup. Relative library paths resolve against
/// `base_dir`.
fn resolve_asset(
    data: AssetData,
    config: &AssetConfig,
    base_dir: &Path,
    file: &Path,
) -> Result<AssetSetup, DataLoadError> {
    let asset_type = AssetType::from(data.asset_type);
    let library = data.library.map(|lib| {
        let lib = PathBuf::from(lib);
        if lib.is_absolute() { lib } else { base_dir.join(lib) }
    });
    if asset_type == AssetType::Procedural && library.is_none() {
        return Err(DataLoadError::MissingLibrary {
            file: file.to_path_buf(),
            asset: data.name,
        });
    }

    Ok(AssetSetup {
        definition: AssetDefinition {
            name: data.name,
            asset_type,
            library,
            selected_asset: data.selected_asset,
        },
        config: config.clone(),
        parameters: data
            .parameters
            .into_iter()
            .map(|p| (p.name, p.value.into()))
            .collect(),
        inputs: data
            .inputs
            .iter()
            .map(|i| (i.name.clone(), i.sources.iter().map(ObjectRef::from).collect()))
            .collect(),
        transform: data
            .translation
            .map_or(Transform::IDENTITY, Transform::from_translation),
    })
}

/// Optional `config.*` of a directory, defaults when absent.
fn load_config(dir: &Path) -> Result<AssetConfig, DataLoadError> {
    match find_data_file(dir, "config")? {
        Some(path) => {
            let config = deserialize_file(&path)?;
            debug!(file = %path.display(), "loaded asset config");
            Ok(config)
        }
        None => Ok(AssetConfig::default()),
    }
}

/// Load one asset from `asset.{ron,toml,json}` and the optional
/// `config.{ron,toml,json}` in `dir`.
pub fn load_asset_setup(dir: &Path) -> Result<AssetSetup, DataLoadError> {
    let config = load_config(dir)?;
    let path = require_data_file(dir, "asset")?;
    let data: AssetData = deserialize_file(&path)?;
    debug!(file = %path.display(), asset = %data.name, "loaded asset definition");
    resolve_asset(data, &config, dir, &path)
}

/// Load every asset listed in `assets.{ron,toml,json}` in `dir`, sharing
/// the directory's optional config. TOML files list them under `[[assets]]`.
pub fn load_asset_manifest(dir: &Path) -> Result<Vec<AssetSetup>, DataLoadError> {
    let config = load_config(dir)?;
    let path = require_data_file(dir, "assets")?;
    let list: Vec<AssetData> = deserialize_list(&path, "assets")?;

    let mut seen = HashSet::new();
    let mut setups = Vec::with_capacity(list.len());
    for data in list {
        if !seen.insert(data.name.clone()) {
            return Err(DataLoadError::DuplicateName {
                file: path.clone(),
                name: data.name,
            });
        }
        setups.push(resolve_asset(data, &config, dir, &path)?);
    }
    debug!(file = %path.display(), count = setups.len(), "loaded asset manifest");
    Ok(setups)
}

// ===========================================================================
// Tests
// ===========================================================================
