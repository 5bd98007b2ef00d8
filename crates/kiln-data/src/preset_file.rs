//! Persisted preset files.
//!
//! A preset file holds one encoded [`PresetStore`] exactly as produced by
//! [`PresetStore::encode`], so files written by older builds load through
//! the same migration chain as in-memory stores.

use std::path::Path;

use kiln_core::preset::PresetStore;
use tracing::{debug, warn};

use crate::loader::DataLoadError;

/// Conventional extension of preset files.
pub const PRESET_EXTENSION: &str = "kpreset";

pub fn write_preset_file(path: &Path, store: &PresetStore) -> Result<(), DataLoadError> {
    let bytes = store.encode()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;
    debug!(file = %path.display(), asset = %store.asset_name, bytes = bytes.len(), "wrote preset");
    Ok(())
}

pub fn read_preset_file(path: &Path) -> Result<PresetStore, DataLoadError> {
    let bytes = std::fs::read(path)?;
    PresetStore::decode(&bytes).map_err(|source| {
        warn!(file = %path.display(), error = %source, "unreadable preset file");
        DataLoadError::Preset {
            file: path.to_path_buf(),
            source,
        }
    })
}
