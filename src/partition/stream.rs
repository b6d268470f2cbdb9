//! Stream boundary
//!
//! Connectors implement [`Stream`]; the core wraps each slice of a stream in
//! a [`StreamPartition`] so workers can read it.

use super::types::{Partition, RecordStream, StreamSlice};
use crate::types::SyncMode;
use std::fmt;
use std::sync::Arc;

/// A connector stream, implemented outside the core.
pub trait Stream: Send + Sync {
    /// Stream name
    fn name(&self) -> &str;

    /// Primary key fields
    fn primary_key(&self) -> Vec<String> {
        Vec::new()
    }

    /// Field the stream is incrementally synced on
    fn cursor_field(&self) -> Option<&str> {
        None
    }

    /// Read the records of one slice
    fn read_records<'a>(&'a self, slice: &'a StreamSlice, sync_mode: SyncMode)
        -> RecordStream<'a>;
}

/// A slice of a [`Stream`], read by delegating to the stream
#[derive(Clone)]
pub struct StreamPartition {
    stream: Arc<dyn Stream>,
    slice: StreamSlice,
    sync_mode: SyncMode,
}

impl StreamPartition {
    /// Create a partition for a slice of a stream
    pub fn new(stream: Arc<dyn Stream>, slice: StreamSlice, sync_mode: SyncMode) -> Self {
        Self {
            stream,
            slice,
            sync_mode,
        }
    }

    /// Sync mode the partition is read with
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }
}

impl Partition for StreamPartition {
    fn stream_name(&self) -> &str {
        self.stream.name()
    }

    fn slice(&self) -> &StreamSlice {
        &self.slice
    }

    fn read(&self) -> RecordStream<'_> {
        self.stream.read_records(&self.slice, self.sync_mode)
    }
}

impl fmt::Debug for StreamPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPartition")
            .field("stream", &self.stream.name())
            .field("slice", &self.slice)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}
