//! Cursor module
//!
//! Incremental-state tracking. A cursor decides whether a record is newer
//! than what previous syncs already delivered, and advances its watermark when
//! a partition closes.
//!
//! # Overview
//!
//! ```text
//! set_initial_state (once) -> should_be_synced (per record)
//!                          -> close_slice (per partition) -> get_stream_state
//! ```
//!
//! Cursors are mutated only by the queue consumer, so they are plain structs.
//! The variant is chosen when the stream is defined; [`Cursor`] dispatches to
//! it.

mod per_partition;
mod simple;
mod types;

pub use per_partition::PerPartitionCursor;
pub use simple::{DatetimeCursor, NoCursor, SimpleCursor};
pub use types::{CursorField, CursorValue, ValueKind};

use crate::error::Result;
use crate::partition::{Record, StreamSlice};
use crate::types::{JsonObject, JsonValue};


/// Contract shared by every cursor variant
pub trait StreamCursor {
    /// Load persisted state. Must be called exactly once, before any
    /// mutating call.
    fn set_initial_state(&mut self, state: Option<&JsonValue>) -> Result<()>;

    /// Whether a record is newer than the closed watermark
    fn should_be_synced(&self, record: &Record) -> bool;

    /// Order two records by their cursor values
    fn is_greater_than_or_equal(&self, a: &JsonObject, b: &JsonObject) -> bool;

    /// Advance the watermark for a finished partition
    fn close_slice(&mut self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> Result<()>;

    /// Export the persisted state
    fn get_stream_state(&self) -> JsonValue;

    /// Narrow a slice's lower bound to the most recent observed record
    fn reduce_slice_range(&self, slice: &StreamSlice, _most_recent: Option<&JsonObject>) -> StreamSlice {
        slice.clone()
    }

    /// Forget the watermark
    fn reset(&mut self);
}

/// Closed set of cursor variants
#[derive(Debug, Clone)]
pub enum Cursor {
    None(NoCursor),
    Simple(SimpleCursor),
    Datetime(DatetimeCursor),
    PerPartition(PerPartitionCursor),
}

impl Cursor {
    /// Cursor for a stream without incremental state
    pub fn none(stream: impl Into<String>) -> Self {
        Cursor::None(NoCursor::new(stream))
    }

    /// Ordinal cursor on a record field
    pub fn simple(stream: impl Into<String>, field: impl Into<String>) -> Self {
        Cursor::Simple(SimpleCursor::new(stream, CursorField::new(field)))
    }

    /// Per-partition cursor on a record field
    pub fn per_partition(stream: impl Into<String>, field: CursorField, max_states: usize) -> Self {
        Cursor::PerPartition(PerPartitionCursor::new(stream, field, max_states))
    }

    /// Record field the cursor reads, if any
    pub fn cursor_field(&self) -> Option<&str> {
        match self {
            Cursor::None(_) => None,
            Cursor::Simple(c) => Some(c.field().name.as_str()),
            Cursor::Datetime(c) => Some(c.field().name.as_str()),
            Cursor::PerPartition(c) => Some(c.field().name.as_str()),
        }
    }

    fn inner(&self) -> &dyn StreamCursor {
        match self {
            Cursor::None(c) => c,
            Cursor::Simple(c) => c,
            Cursor::Datetime(c) => c,
            Cursor::PerPartition(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn StreamCursor {
        match self {
            Cursor::None(c) => c,
            Cursor::Simple(c) => c,
            Cursor::Datetime(c) => c,
            Cursor::PerPartition(c) => c,
        }
    }
}

impl StreamCursor for Cursor {
    fn set_initial_state(&mut self, state: Option<&JsonValue>) -> Result<()> {
        self.inner_mut().set_initial_state(state)
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        self.inner().should_be_synced(record)
    }

    fn is_greater_than_or_equal(&self, a: &JsonObject, b: &JsonObject) -> bool {
        self.inner().is_greater_than_or_equal(a, b)
    }

    fn close_slice(&mut self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> Result<()> {
        self.inner_mut().close_slice(slice, most_recent)
    }

    fn get_stream_state(&self) -> JsonValue {
        self.inner().get_stream_state()
    }

    fn reduce_slice_range(&self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> StreamSlice {
        self.inner().reduce_slice_range(slice, most_recent)
    }

    fn reset(&mut self) {
        self.inner_mut().reset();
    }
}

impl From<SimpleCursor> for Cursor {
    fn from(cursor: SimpleCursor) -> Self {
        Cursor::Simple(cursor)
    }
}

impl From<DatetimeCursor> for Cursor {
    fn from(cursor: DatetimeCursor) -> Self {
        Cursor::Datetime(cursor)
    }
}

impl From<PerPartitionCursor> for Cursor {
    fn from(cursor: PerPartitionCursor) -> Self {
        Cursor::PerPartition(cursor)
    }
}
