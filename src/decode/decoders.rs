//! Decoder implementations
//!
//! Each decoder handles a specific response format.

use super::types::{Decoder, DecoderFormat};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};

/// Build the decoder for a format
pub fn decoder_for(format: DecoderFormat, records_path: Option<&str>) -> Box<dyn Decoder> {
    match (format, records_path) {
        (DecoderFormat::Json, Some(path)) => Box::new(JsonDecoder::with_path(path)),
        (DecoderFormat::Json, None) => Box::new(JsonDecoder::new()),
        (DecoderFormat::Jsonl, _) => Box::new(JsonlDecoder::new()),
    }
}

// ============================================================================
// JSON Decoder
// ============================================================================

/// JSON decoder with optional record path extraction
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    /// Dot path to the records
    records_path: Option<String>,
}

impl JsonDecoder {
    /// Create a new JSON decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON decoder with a record path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            records_path: Some(path.into()),
        }
    }

    /// Extract records from a JSON value using the path
    fn extract_records(&self, value: JsonValue) -> Result<Vec<JsonObject>> {
        let selected = match &self.records_path {
            Some(path) => extract_path(&value, path).unwrap_or(JsonValue::Null),
            None => value,
        };
        match selected {
            JsonValue::Array(items) => items.into_iter().map(into_record).collect(),
            JsonValue::Null => Ok(Vec::new()),
            other => Ok(vec![into_record(other)?]),
        }
    }
}

impl Decoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Vec<JsonObject>> {
        let value = self.decode_raw(body)?;
        self.extract_records(value)
    }

    fn decode_raw(&self, body: &[u8]) -> Result<JsonValue> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(body).map_err(|e| Error::decode(format!("Failed to parse JSON: {e}")))
    }
}

// ============================================================================
// JSONL Decoder
// ============================================================================

/// JSON Lines decoder (one JSON object per line)
#[derive(Debug, Clone, Default)]
pub struct JsonlDecoder;

impl JsonlDecoder {
    /// Create a new JSONL decoder
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for JsonlDecoder {
    fn decode(&self, body: &[u8]) -> Result<Vec<JsonObject>> {
        let text = std::str::from_utf8(body)
            .map_err(|e| Error::decode(format!("JSONL body is not UTF-8: {e}")))?;

        let mut records = Vec::new();
        for (line_num, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: JsonValue = serde_json::from_str(line).map_err(|e| {
                Error::decode(format!("Failed to parse JSONL at line {}: {e}", line_num + 1))
            })?;
            records.push(into_record(value)?);
        }
        Ok(records)
    }

    fn decode_raw(&self, body: &[u8]) -> Result<JsonValue> {
        let records = self.decode(body)?;
        Ok(JsonValue::Array(
            records.into_iter().map(JsonValue::Object).collect(),
        ))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn into_record(value: JsonValue) -> Result<JsonObject> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::decode(format!("Expected a JSON object record, got {other}"))),
    }
}

/// Extract a value using a dot path such as `data.items`, `results[0].id`,
/// `items[-1]` or `$.data`.
pub fn extract_path(value: &JsonValue, path: &str) -> Option<JsonValue> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() || path == "$" {
        return Some(value.clone());
    }

    let mut current = value;
    for part in path.split('.') {
        let Some(bracket_pos) = part.find('[') else {
            current = current.get(part)?;
            continue;
        };

        let name = &part[..bracket_pos];
        let index_str = part[bracket_pos + 1..].strip_suffix(']')?;
        if !name.is_empty() {
            current = current.get(name)?;
        }
        if index_str == "*" {
            // The whole array is the selection
            return Some(current.clone());
        }

        let index: i64 = index_str.parse().ok()?;
        let JsonValue::Array(items) = current else {
            return None;
        };
        let idx = if index < 0 {
            items.len().checked_sub(index.unsigned_abs() as usize)?
        } else {
            index as usize
        };
        current = items.get(idx)?;
    }

    Some(current.clone())
}
