//! State types for tracking sync progress
//!
//! Each stream's state is whatever its cursor exported; it is stored as
//! opaque JSON and handed back to the same cursor on the next run.

use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete state for a connector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream cursor state
    #[serde(default)]
    pub streams: BTreeMap<String, JsonValue>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&JsonValue> {
        self.streams.get(stream)
    }

    /// Replace the state of a stream.
    ///
    /// An empty object removes the entry so streams without progress leave
    /// no trace in the file.
    pub fn set_stream(&mut self, stream: &str, state: JsonValue) {
        if state.as_object().is_some_and(serde_json::Map::is_empty) {
            self.streams.remove(stream);
        } else {
            self.streams.insert(stream.to_string(), state);
        }
    }

    /// Remove the state of a stream
    pub fn remove_stream(&mut self, stream: &str) -> Option<JsonValue> {
        self.streams.remove(stream)
    }
}
