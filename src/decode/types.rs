//! Decoder types and traits
//!
//! Defines the core decoder abstractions.

use crate::error::Result;
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// Format of the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// JSON Lines format (one JSON object per line)
    Jsonl,
}

/// Trait for decoding response bodies into records
pub trait Decoder: Send + Sync {
    /// Decode the response body into records
    fn decode(&self, body: &[u8]) -> Result<Vec<JsonObject>>;

    /// Decode the response body into a single JSON value (full response)
    fn decode_raw(&self, body: &[u8]) -> Result<JsonValue>;
}
