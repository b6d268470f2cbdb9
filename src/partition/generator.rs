//! Partition generators
//!
//! A generator turns a stream plus its resume state into the lazy sequence of
//! partitions the worker pool drains.

use super::slicers::SliceSource;
use super::stream::{Stream, StreamPartition};
use super::types::Partition;
use crate::error::{Error, Result};
use crate::types::{JsonValue, SyncMode};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Lazy sequence of partitions. Items may be errors when producing a
/// partition involves remote work (async jobs).
pub type PartitionStream = BoxStream<'static, Result<Arc<dyn Partition>>>;

/// Keys a per-partition state may carry besides cursor fields
const PER_PARTITION_STATE_KEYS: [&str; 3] = ["states", "state", "evicted_boundary"];

/// Trait for partition generators
pub trait PartitionGenerator: Send + Sync {
    /// Name of the stream partitions are generated for
    fn stream_name(&self) -> &str;

    /// Generate partitions.
    ///
    /// Full refresh ignores `resume_state`; incremental restarts from it.
    /// Fails with a configuration error when the state references a cursor
    /// field the stream does not define.
    fn generate(&self, sync_mode: SyncMode, resume_state: Option<&JsonValue>)
        -> Result<PartitionStream>;
}

/// Generator reading each slice of a [`SliceSource`] from a [`Stream`]
#[derive(Clone)]
pub struct StreamPartitionGenerator {
    stream: Arc<dyn Stream>,
    slicer: Arc<dyn SliceSource>,
}

impl StreamPartitionGenerator {
    /// Create a generator for a stream
    pub fn new(stream: Arc<dyn Stream>, slicer: Arc<dyn SliceSource>) -> Self {
        Self { stream, slicer }
    }
}

impl PartitionGenerator for StreamPartitionGenerator {
    fn stream_name(&self) -> &str {
        self.stream.name()
    }

    fn generate(
        &self,
        sync_mode: SyncMode,
        resume_state: Option<&JsonValue>,
    ) -> Result<PartitionStream> {
        let resume_state = match sync_mode {
            SyncMode::FullRefresh => None,
            SyncMode::Incremental => resume_state,
        };
        if let Some(state) = resume_state {
            validate_resume_state(self.stream.name(), self.stream.cursor_field(), state)?;
        }

        let slices = self.slicer.slices(sync_mode, resume_state)?;
        debug!(stream = %self.stream.name(), ?sync_mode, "Generating partitions");

        let stream = Arc::clone(&self.stream);
        let partitions = slices.map(move |slice| {
            let partition: Arc<dyn Partition> =
                Arc::new(StreamPartition::new(Arc::clone(&stream), slice, sync_mode));
            Ok(partition)
        });

        Ok(stream::iter(partitions).boxed())
    }
}

/// Check that a persisted state only refers to the stream's cursor field.
pub fn validate_resume_state(
    stream: &str,
    cursor_field: Option<&str>,
    state: &JsonValue,
) -> Result<()> {
    let Some(object) = state.as_object() else {
        if state.is_null() {
            return Ok(());
        }
        return Err(Error::config(format!(
            "Resume state for stream '{stream}' must be an object"
        )));
    };

    let unknown = |field: &str| Error::UnknownCursorField {
        stream: stream.to_string(),
        field: field.to_string(),
    };
    let check_keys = |cursor: &JsonValue| -> Result<()> {
        for key in cursor.as_object().into_iter().flat_map(|o| o.keys()) {
            if Some(key.as_str()) != cursor_field {
                return Err(unknown(key));
            }
        }
        Ok(())
    };

    for key in object.keys() {
        if Some(key.as_str()) == cursor_field || PER_PARTITION_STATE_KEYS.contains(&key.as_str()) {
            continue;
        }
        return Err(unknown(key));
    }

    if let Some(global) = object.get("state") {
        check_keys(global)?;
    }
    if let Some(states) = object.get("states").and_then(JsonValue::as_array) {
        for entry in states {
            if let Some(cursor) = entry.get("cursor") {
                check_keys(cursor)?;
            }
        }
    }

    Ok(())
}
