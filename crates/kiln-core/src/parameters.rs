//! Locally cached parameter values and input connections of an asset.
//!
//! Both keep a dirty marker per entry. A recook uploads only what is dirty
//! (or everything when forced); a rebuild against a fresh session node marks
//! everything dirty first.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::id::SessionNodeId;
use crate::preset::InputPreset;
use crate::session::{GenerationSession, ObjectRef, ParameterValue, SessionError};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: BTreeMap<String, ParameterValue>,
    dirty: BTreeSet<String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `value`. Returns `false` if it equals the cached value.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> bool {
        if self.values.get(name) == Some(&value) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = self.values.keys().cloned().collect();
    }

    /// Forget every cached value, e.g. after the session's values were
    /// replaced wholesale.
    pub fn clear(&mut self) {
        self.values.clear();
        self.dirty.clear();
    }

    /// Upload dirty values (or all values when `all`) to `node`. Returns the
    /// number of values written.
    pub fn upload(
        &mut self,
        session: &mut dyn GenerationSession,
        node: SessionNodeId,
        all: bool,
    ) -> Result<usize, SessionError> {
        let names: Vec<String> = if all {
            self.values.keys().cloned().collect()
        } else {
            self.dirty.iter().cloned().collect()
        };
        for name in &names {
            if let Some(value) = self.values.get(name) {
                session.set_parameter_value(node, name, value)?;
            }
            self.dirty.remove(name);
        }
        Ok(names.len())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The external objects wired into one named asset input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConnection {
    pub name: String,
    pub sources: Vec<ObjectRef>,
    dirty: bool,
}

impl InputConnection {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    connections: Vec<InputConnection>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&InputConnection> {
        self.connections.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputConnection> {
        self.connections.iter()
    }

    /// Replace the sources of input `name`. An empty list disconnects it.
    pub fn connect(&mut self, name: &str, sources: Vec<ObjectRef>) {
        match self.connections.iter_mut().find(|c| c.name == name) {
            Some(connection) => {
                if connection.sources != sources {
                    connection.sources = sources;
                    connection.dirty = true;
                }
            }
            None => self.connections.push(InputConnection {
                name: name.to_string(),
                sources,
                dirty: true,
            }),
        }
    }

    pub fn disconnect(&mut self, name: &str) {
        self.connect(name, Vec::new());
    }

    pub fn is_dirty(&self) -> bool {
        self.connections.iter().any(|c| c.dirty)
    }

    pub fn mark_all_dirty(&mut self) {
        for connection in &mut self.connections {
            connection.dirty = true;
        }
    }

    /// Presets for every connected input.
    pub fn snapshot(&self) -> Vec<InputPreset> {
        self.connections
            .iter()
            .filter(|c| !c.sources.is_empty())
            .map(|c| InputPreset {
                input_name: c.name.clone(),
                sources: c.sources.clone(),
            })
            .collect()
    }

    /// Upload dirty connections to `node`. Inputs the node does not expose
    /// are skipped with a warning. Returns the number of inputs written.
    pub fn upload(
        &mut self,
        session: &mut dyn GenerationSession,
        node: SessionNodeId,
    ) -> Result<usize, SessionError> {
        if !self.is_dirty() {
            return Ok(0);
        }
        let names = session.input_names(node)?;
        let mut written = 0;
        for connection in self.connections.iter_mut().filter(|c| c.dirty) {
            connection.dirty = false;
            let Some(index) = names.iter().position(|n| *n == connection.name) else {
                warn!(input = %connection.name, "asset exposes no such input");
                continue;
            };
            if connection.sources.is_empty() {
                session.disconnect_input(node, index)?;
            } else {
                session.connect_input(node, index, &connection.sources)?;
            }
            written += 1;
        }
        Ok(written)
    }
}
