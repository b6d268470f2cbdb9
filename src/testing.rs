//! Fixtures shared by unit tests

use crate::error::Result;
use crate::partition::{Partition, Record, RecordStream, Stream, StreamSlice};
use crate::types::{JsonObject, JsonValue, SyncMode};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

type RecordFn = dyn Fn(&StreamSlice) -> Vec<Result<JsonObject>> + Send + Sync;

/// Stream whose records are computed from the slice being read
pub(crate) struct FixtureStream {
    name: String,
    cursor_field: Option<String>,
    records: Arc<RecordFn>,
}

impl FixtureStream {
    pub(crate) fn new(
        name: &str,
        records: impl Fn(&StreamSlice) -> Vec<Result<JsonObject>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            cursor_field: None,
            records: Arc::new(records),
        }
    }

    pub(crate) fn with_cursor_field(mut self, field: &str) -> Self {
        self.cursor_field = Some(field.to_string());
        self
    }
}

impl Stream for FixtureStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_key(&self) -> Vec<String> {
        vec!["id".to_string()]
    }

    fn cursor_field(&self) -> Option<&str> {
        self.cursor_field.as_deref()
    }

    fn read_records<'a>(&'a self, slice: &'a StreamSlice, _sync_mode: SyncMode) -> RecordStream<'a> {
        stream::iter((self.records)(slice)).boxed()
    }
}

/// Partition that yields nothing, for building records in cursor tests
#[derive(Debug)]
pub(crate) struct FixturePartition {
    stream: String,
    slice: StreamSlice,
}

impl FixturePartition {
    pub(crate) fn new(stream: &str, slice: StreamSlice) -> Arc<dyn Partition> {
        Arc::new(Self {
            stream: stream.to_string(),
            slice,
        })
    }
}

impl Partition for FixturePartition {
    fn stream_name(&self) -> &str {
        &self.stream
    }

    fn slice(&self) -> &StreamSlice {
        &self.slice
    }

    fn read(&self) -> RecordStream<'_> {
        stream::empty().boxed()
    }
}

/// Turn a `json!({...})` literal into a record object
pub(crate) fn object(value: JsonValue) -> JsonObject {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Build a record attributed to a fixture partition over `slice`
pub(crate) fn record(value: JsonValue, slice: StreamSlice) -> Record {
    Record::new(object(value), FixturePartition::new("fixture", slice), 0)
}
