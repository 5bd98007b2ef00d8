use std::collections::{BTreeMap, HashSet};

use crate::host::{HostError, OutputHost, Resource};
use crate::id::{HostHandle, MaterialKey};

/// Host materials created for session-generated material keys, shared by
/// every part of one asset.
#[derive(Debug, Clone, Default)]
pub struct MaterialCache {
    entries: BTreeMap<MaterialKey, HostHandle>,
}

impl MaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached material for `key`, creating it on first use.
    pub fn resolve(
        &mut self,
        key: &MaterialKey,
        host: &mut dyn OutputHost,
    ) -> Result<HostHandle, HostError> {
        if let Some(handle) = self.entries.get(key) {
            return Ok(*handle);
        }
        let handle = host.create_material(key)?;
        self.entries.insert(key.clone(), handle);
        Ok(handle)
    }

    pub fn get(&self, key: &MaterialKey) -> Option<HostHandle> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every cached material whose handle is not in `in_use`.
    /// Returns how many were released.
    pub fn retain_used(&mut self, in_use: &HashSet<HostHandle>, host: &mut dyn OutputHost) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, handle| {
            let keep = in_use.contains(handle);
            if !keep {
                host.release(Resource::Material(*handle));
            }
            keep
        });
        before - self.entries.len()
    }

    /// Release every cached material.
    pub fn clear(&mut self, host: &mut dyn OutputHost) {
        for (_, handle) in std::mem::take(&mut self.entries) {
            host.release(Resource::Material(handle));
        }
    }
}
