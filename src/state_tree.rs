//! # Persisted State
//!
//! Hosts store plugin state as an opaque byte blob. Ours is a small
//! property tree: a root name plus one named scalar per parameter, keyed
//! by [`PluginParameter::id()`]. Keyed storage means adding a parameter
//! later does not break old sessions, since missing keys take their
//! defaults and unknown keys are ignored.
//!
//! Bytes are bincode. Loading is self-healing: anything that fails to
//! parse is replaced by the default tree, so a corrupt session never keeps
//! the plugin from loading.

use std::collections::BTreeMap;
use std::io::Write;

use nih_plug::nih_warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::{PluginParameter, PluginState};

/// Name of the tree's root node.
pub const ROOT_NAME: &str = "AuraState";

#[derive(Debug, Error)]
pub enum StateTreeError {
    #[error("failed to encode the state tree")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode the state tree")]
    Decode(#[source] bincode::Error),

    #[error("failed to export the state tree as JSON")]
    Json(#[from] serde_json::Error),

    #[error("state tree root is named {found:?}, expected {expected:?}")]
    InvalidRoot {
        found: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTree {
    name: String,
    properties: BTreeMap<String, f32>,
}

impl PropertyTree {
    /// The tree for [`PluginState::default()`].
    pub fn create_default() -> Self {
        Self::from_state(&PluginState::default())
    }

    pub fn from_state(state: &PluginState) -> Self {
        Self {
            name: ROOT_NAME.to_owned(),
            properties: PluginParameter::ALL
                .into_iter()
                .map(|key| (key.id().to_owned(), state.get(key)))
                .collect(),
        }
    }

    /// Builds a snapshot from the tree. Missing and non-finite properties
    /// keep their default values, so the result always validates.
    pub fn to_state(&self) -> PluginState {
        let mut state = PluginState::default();
        for key in PluginParameter::ALL {
            match self.properties.get(key.id()) {
                Some(&value) if value.is_finite() => state.set(key, value),
                Some(&value) => {
                    nih_warn!("Ignoring stored {} = {value}, using its default", key.id());
                }
                None => {}
            }
        }
        state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self, id: &str) -> Option<f32> {
        self.properties.get(id).copied()
    }

    pub fn set_property(&mut self, id: impl Into<String>, value: f32) {
        self.properties.insert(id.into(), value);
    }

    pub fn write_to_stream(&self, writer: impl Write) -> Result<(), StateTreeError> {
        bincode::serialize_into(writer, self).map_err(StateTreeError::Encode)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StateTreeError> {
        bincode::serialize(self).map_err(StateTreeError::Encode)
    }

    /// Parses a tree. Fails on malformed bytes or a foreign root.
    pub fn read_from_data(data: &[u8]) -> Result<Self, StateTreeError> {
        let tree: PropertyTree = bincode::deserialize(data).map_err(StateTreeError::Decode)?;
        if tree.name != ROOT_NAME {
            return Err(StateTreeError::InvalidRoot {
                found: tree.name,
                expected: ROOT_NAME,
            });
        }
        Ok(tree)
    }

    /// [`read_from_data()`](Self::read_from_data), falling back to the
    /// default tree on any failure.
    pub fn copy_from_or_default(data: &[u8]) -> Self {
        match Self::read_from_data(data) {
            Ok(tree) => tree,
            Err(err) => {
                nih_warn!("Discarding unreadable plugin state ({err}), using defaults");
                Self::create_default()
            }
        }
    }

    /// Pretty-printed JSON. Debug output only, never read back.
    pub fn to_debug_json(&self) -> Result<String, StateTreeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
