//! Stream-wide cursors
//!
//! [`SimpleCursor`] keeps one watermark for the whole stream.
//! [`DatetimeCursor`] does the same over datetime values, adding an earliest
//! start and a lookback window. [`NoCursor`] serves streams without one.

use super::types::{max_watermark, CursorField, CursorValue, InitGuard, ValueKind};
use super::StreamCursor;
use crate::error::{Error, Result};
use crate::partition::{Record, StreamSlice};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

// ============================================================================
// Simple Cursor
// ============================================================================

/// One watermark for the whole stream.
///
/// Records are filtered against the watermark loaded at sync start. Slices
/// closing during the sync only advance the persisted watermark, so a slow
/// partition never loses records to a faster one.
#[derive(Debug, Clone)]
pub struct SimpleCursor {
    stream: String,
    field: CursorField,
    /// lower bound for emission, fixed by `set_initial_state`
    sync_from: Option<CursorValue>,
    watermark: Option<CursorValue>,
    guard: InitGuard,
}

impl SimpleCursor {
    /// Create a cursor for a stream
    pub fn new(stream: impl Into<String>, field: CursorField) -> Self {
        Self {
            stream: stream.into(),
            field,
            sync_from: None,
            watermark: None,
            guard: InitGuard::default(),
        }
    }

    /// Cursor field description
    pub fn field(&self) -> &CursorField {
        &self.field
    }

    /// Current watermark
    pub fn watermark(&self) -> Option<&CursorValue> {
        self.watermark.as_ref()
    }

    /// Watermark records are compared against during this sync
    pub fn sync_from(&self) -> Option<&CursorValue> {
        self.sync_from.as_ref()
    }
}

impl StreamCursor for SimpleCursor {
    fn set_initial_state(&mut self, state: Option<&JsonValue>) -> Result<()> {
        self.guard.begin(&self.stream)?;

        let Some(raw) = state.and_then(|s| s.get(&self.field.name)) else {
            return Ok(());
        };
        let value = self.field.kind.parse(raw).ok_or_else(|| {
            Error::config(format!(
                "State value {raw} for '{}' of stream '{}' is not a cursor value",
                self.field.name, self.stream
            ))
        })?;
        self.sync_from = Some(value.clone());
        self.watermark = Some(value);
        Ok(())
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        match (self.field.value_of(record.data()), &self.sync_from) {
            (Some(value), Some(from)) => value > *from,
            _ => true,
        }
    }

    fn is_greater_than_or_equal(&self, a: &JsonObject, b: &JsonObject) -> bool {
        self.field.is_greater_than_or_equal(a, b)
    }

    fn close_slice(&mut self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> Result<()> {
        self.guard.ensure(&self.stream, "close_slice")?;

        let upper = self.field.slice_end(slice)?;
        let recent = most_recent.and_then(|r| self.field.value_of(r));
        self.watermark = max_watermark(self.watermark.take(), upper, recent);

        debug!(stream = %self.stream, slice = %slice, watermark = ?self.watermark, "Closed slice");
        Ok(())
    }

    fn get_stream_state(&self) -> JsonValue {
        match &self.watermark {
            Some(value) => json!({ self.field.name.clone(): self.field.kind.to_json(value) }),
            None => json!({}),
        }
    }

    fn reduce_slice_range(&self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> StreamSlice {
        self.field.narrow(slice, most_recent)
    }

    fn reset(&mut self) {
        self.sync_from = None;
        self.watermark = None;
    }
}

// ============================================================================
// Datetime Cursor
// ============================================================================

/// Datetime watermark with an earliest start and a lookback window.
///
/// Records older than `start` are never synced. The lookback only moves the
/// point an incremental sync restarts from; the emission decision still uses
/// the exact watermark loaded at sync start.
#[derive(Debug, Clone)]
pub struct DatetimeCursor {
    inner: SimpleCursor,
    start: Option<DateTime<Utc>>,
    lookback: Duration,
}

impl DatetimeCursor {
    /// Create a datetime cursor persisting values with `format`
    pub fn new(stream: impl Into<String>, field: impl Into<String>, format: impl Into<String>) -> Self {
        let field = CursorField::new(field).with_kind(ValueKind::datetime_with_format(format));
        Self {
            inner: SimpleCursor::new(stream, field),
            start: None,
            lookback: Duration::zero(),
        }
    }

    /// Set the slice keys of the window boundaries
    #[must_use]
    pub fn with_boundary(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.inner.field = self.inner.field.with_boundary(start, end);
        self
    }

    /// Set the earliest datetime ever synced
    #[must_use]
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the lookback window
    #[must_use]
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn field(&self) -> &CursorField {
        self.inner.field()
    }

    /// Current watermark
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self.inner.watermark() {
            Some(CursorValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Where the next incremental read should start
    pub fn resume_from(&self) -> Option<DateTime<Utc>> {
        let resumed = self.watermark().map(|w| w - self.lookback);
        match (resumed, self.start) {
            (Some(resumed), Some(start)) => Some(resumed.max(start)),
            (resumed, start) => resumed.or(start),
        }
    }
}

impl StreamCursor for DatetimeCursor {
    fn set_initial_state(&mut self, state: Option<&JsonValue>) -> Result<()> {
        self.inner.set_initial_state(state)
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        if let (Some(start), Some(CursorValue::DateTime(value))) =
            (self.start, self.inner.field.value_of(record.data()))
        {
            if value < start {
                return false;
            }
        }
        self.inner.should_be_synced(record)
    }

    fn is_greater_than_or_equal(&self, a: &JsonObject, b: &JsonObject) -> bool {
        self.inner.is_greater_than_or_equal(a, b)
    }

    fn close_slice(&mut self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> Result<()> {
        self.inner.close_slice(slice, most_recent)
    }

    fn get_stream_state(&self) -> JsonValue {
        self.inner.get_stream_state()
    }

    fn reduce_slice_range(&self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> StreamSlice {
        self.inner.reduce_slice_range(slice, most_recent)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

// ============================================================================
// No Cursor
// ============================================================================

/// Cursor for full-refresh streams: syncs everything, persists nothing
#[derive(Debug, Clone, Default)]
pub struct NoCursor {
    stream: String,
    guard: InitGuard,
}

impl NoCursor {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            guard: InitGuard::default(),
        }
    }
}

impl StreamCursor for NoCursor {
    fn set_initial_state(&mut self, _state: Option<&JsonValue>) -> Result<()> {
        self.guard.begin(&self.stream)
    }

    fn should_be_synced(&self, _record: &Record) -> bool {
        true
    }

    fn is_greater_than_or_equal(&self, _a: &JsonObject, _b: &JsonObject) -> bool {
        true
    }

    fn close_slice(&mut self, _slice: &StreamSlice, _most_recent: Option<&JsonObject>) -> Result<()> {
        self.guard.ensure(&self.stream, "close_slice")
    }

    fn get_stream_state(&self) -> JsonValue {
        json!({})
    }

    fn reset(&mut self) {}
}
