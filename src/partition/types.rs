//! Partition types and traits
//!
//! Defines the core partition abstractions: the slice descriptor a partition
//! is identified by, the `Partition` trait workers read from, and the
//! `Record` values handed to callers.

use crate::error::Result;
use crate::types::{JsonObject, JsonValue};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Stream Slice
// ============================================================================

/// Descriptor of one unit of work within a stream.
///
/// The `partition` part names the entity being read (an account, a parent
/// id); the `cursor_slice` part holds the cursor window (`start`/`end`
/// boundaries). Both are ordered maps so the serialized form is canonical and
/// can be used as an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSlice {
    /// Entity-selecting values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partition: BTreeMap<String, JsonValue>,
    /// Cursor window values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cursor_slice: BTreeMap<String, JsonValue>,
}

impl StreamSlice {
    /// Create an empty slice
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition value
    #[must_use]
    pub fn with_partition(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.partition.insert(key.into(), value.into());
        self
    }

    /// Add a cursor window value
    #[must_use]
    pub fn with_cursor(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.cursor_slice.insert(key.into(), value.into());
        self
    }

    /// Look a key up in the partition values, then in the cursor window
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.partition
            .get(key)
            .or_else(|| self.cursor_slice.get(key))
    }

    /// Get a cursor window value
    pub fn cursor_value(&self, key: &str) -> Option<&JsonValue> {
        self.cursor_slice.get(key)
    }

    /// Whether the slice carries no values at all
    pub fn is_empty(&self) -> bool {
        self.partition.is_empty() && self.cursor_slice.is_empty()
    }

    /// Canonical string identity of the whole slice
    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Canonical string identity of the partition part only
    pub fn partition_key(&self) -> String {
        serde_json::to_string(&self.partition).unwrap_or_default()
    }
}

impl Hash for StreamSlice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for StreamSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// ============================================================================
// Partition Key
// ============================================================================

/// Identity of a partition: stream name plus slice descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    /// Stream the partition belongs to
    pub stream: String,
    /// Canonical slice descriptor
    pub slice: String,
}

impl PartitionKey {
    /// Build the key for a slice of a stream
    pub fn new(stream: impl Into<String>, slice: &StreamSlice) -> Self {
        Self {
            stream: stream.into(),
            slice: slice.key(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stream, self.slice)
    }
}

// ============================================================================
// Partition
// ============================================================================

/// Lazy, finite, non-restartable sequence of raw records
pub type RecordStream<'a> = BoxStream<'a, Result<JsonObject>>;

/// A unit of work that knows how to produce its records.
///
/// Partitions are immutable once created and are read by exactly one worker.
/// Network I/O happens inside [`Partition::read`], never at construction.
pub trait Partition: Send + Sync + fmt::Debug {
    /// Name of the stream this partition belongs to
    fn stream_name(&self) -> &str;

    /// Slice descriptor identifying this partition
    fn slice(&self) -> &StreamSlice;

    /// Open the partition and stream its records
    fn read(&self) -> RecordStream<'_>;

    /// Identity of this partition
    fn key(&self) -> PartitionKey {
        PartitionKey::new(self.stream_name(), self.slice())
    }
}

// ============================================================================
// Record
// ============================================================================

/// A record pulled off the shared queue, attributed to its source partition
#[derive(Debug, Clone)]
pub struct Record {
    data: JsonObject,
    partition: Arc<dyn Partition>,
    emitted_at: i64,
}

impl Record {
    /// Wrap raw data coming from a partition
    pub fn new(data: JsonObject, partition: Arc<dyn Partition>, emitted_at: i64) -> Self {
        Self {
            data,
            partition,
            emitted_at,
        }
    }

    /// Record fields
    pub fn data(&self) -> &JsonObject {
        &self.data
    }

    /// Look a field up
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.data.get(field)
    }

    /// Partition the record was read from
    pub fn partition(&self) -> &Arc<dyn Partition> {
        &self.partition
    }

    /// Stream the record belongs to
    pub fn stream_name(&self) -> &str {
        self.partition.stream_name()
    }

    /// Emission timestamp in epoch milliseconds, strictly increasing per sync
    pub fn emitted_at(&self) -> i64 {
        self.emitted_at
    }

    /// Take the fields out of the record
    pub fn into_data(self) -> JsonObject {
        self.data
    }

    /// Split into fields and source partition
    pub fn into_parts(self) -> (JsonObject, Arc<dyn Partition>) {
        (self.data, self.partition)
    }
}
