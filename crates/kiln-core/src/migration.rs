//! Preset format migration.
//!
//! A registry of functions that lift a serialized preset payload from one
//! format version to the next, so stores written by older builds keep
//! loading after the format grows.

use std::collections::BTreeMap;

use crate::preset::PresetStore;
use crate::serialize::{PresetBodyV1, PresetBodyV2, from_bytes, to_bytes};

/// Errors that can occur during migration.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("no migration path from version {from} to version {to}")]
    NoMigrationPath { from: u32, to: u32 },
    #[error("migration from version {from} to version {to} failed: {reason}")]
    MigrationFailed { from: u32, to: u32, reason: String },
}

/// A function that transforms a payload from one version to the next.
pub type MigrationFn = fn(&[u8]) -> Result<Vec<u8>, MigrationError>;

/// Registry of migration functions keyed by source version.
///
/// Each registered function migrates data from `version N` to `version N+1`.
/// The registry chains these steps to migrate across multiple versions.
pub struct MigrationRegistry {
    migrations: BTreeMap<u32, MigrationFn>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Register a migration function from `from_version` to `from_version + 1`.
    pub fn register(&mut self, from_version: u32, migrate: MigrationFn) {
        self.migrations.insert(from_version, migrate);
    }

    /// Check whether a complete migration path exists from `from` to `to`.
    pub fn can_migrate(&self, from: u32, to: u32) -> bool {
        if from >= to {
            return from == to;
        }
        (from..to).all(|v| self.migrations.contains_key(&v))
    }

    /// Migrate a payload from version `from` to version `to`.
    pub fn migrate(&self, data: &[u8], from: u32, to: u32) -> Result<Vec<u8>, MigrationError> {
        if from == to {
            return Ok(data.to_vec());
        }
        if from > to {
            return Err(MigrationError::NoMigrationPath { from, to });
        }

        let mut current = data.to_vec();
        for version in from..to {
            let step = self
                .migrations
                .get(&version)
                .ok_or(MigrationError::NoMigrationPath { from, to })?;
            current = step(&current)?;
        }
        Ok(current)
    }

    /// Number of registered migration steps.
    pub fn step_count(&self) -> usize {
        self.migrations.len()
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Preset history
// ---------------------------------------------------------------------------

/// The registry covering every preset format version ever written.
pub fn preset_migrations() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry.register(1, v1_to_v2);
    registry.register(2, v2_to_v3);
    registry
}

fn failed(from: u32, reason: impl ToString) -> MigrationError {
    MigrationError::MigrationFailed {
        from,
        to: from + 1,
        reason: reason.to_string(),
    }
}

/// v2 added input connections and volume layers, both empty by default.
fn v1_to_v2(data: &[u8]) -> Result<Vec<u8>, MigrationError> {
    let v1: PresetBodyV1 = from_bytes(data).map_err(|e| failed(1, e))?;
    to_bytes(&PresetBodyV2 {
        asset_name: v1.asset_name,
        parameters: v1.parameters,
        curves: v1.curves,
        inputs: Vec::new(),
        volume_layers: Vec::new(),
    })
    .map_err(|e| failed(1, e))
}

/// v3 added the asset type tag. Stores without one never report a type
/// mismatch.
fn v2_to_v3(data: &[u8]) -> Result<Vec<u8>, MigrationError> {
    let v2: PresetBodyV2 = from_bytes(data).map_err(|e| failed(2, e))?;
    to_bytes(&PresetStore {
        asset_name: v2.asset_name,
        asset_type: None,
        parameters: v2.parameters,
        curves: v2.curves,
        inputs: v2.inputs,
        volume_layers: v2.volume_layers,
    })
    .map_err(|e| failed(2, e))
}
