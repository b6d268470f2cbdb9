//! Pagination loop detection across slice retries

use crate::cursor::{Cursor, StreamCursor};
use crate::error::{Error, Result};
use crate::partition::StreamSlice;
use crate::types::JsonObject;
use tracing::{debug, info};

/// Same-slice retries allowed when a cursor can narrow the window
const MAX_SAME_SLICE_WITH_CURSOR: usize = 1;
/// Same-slice retries allowed for a plain retry
const MAX_SAME_SLICE_WITHOUT_CURSOR: usize = 2;

/// Tracks records read in a slice and narrows the slice when pagination must
/// restart.
///
/// A slice that comes back unchanged too many times in a row means the read
/// can never make progress; the tracker fails fast instead of looping.
#[derive(Debug, Clone, Default)]
pub struct PaginationTracker {
    cursor: Option<Cursor>,
    max_records: Option<u64>,
    record_count: u64,
    most_recent: Option<JsonObject>,
    same_slice_attempts: usize,
}

impl PaginationTracker {
    pub fn new(cursor: Option<Cursor>, max_records: Option<u64>) -> Self {
        Self {
            cursor,
            max_records,
            ..Default::default()
        }
    }

    /// Count a record and remember it as the most recent one
    pub fn observe(&mut self, record: &JsonObject) {
        self.record_count += 1;
        let newer = match (&self.cursor, &self.most_recent) {
            (Some(cursor), Some(current)) => cursor.is_greater_than_or_equal(record, current),
            _ => true,
        };
        if newer {
            self.most_recent = Some(record.clone());
        }
    }

    /// Records observed since the last reset
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn has_reached_limit(&self) -> bool {
        self.max_records
            .is_some_and(|max| self.record_count >= max)
    }

    /// Slice to restart pagination with.
    ///
    /// With a cursor, `original` is narrowed to start at the most recent
    /// observed record; without one, `previous` is retried as is.
    pub fn reduce_slice_range_if_possible(
        &mut self,
        previous: &StreamSlice,
        original: &StreamSlice,
    ) -> Result<StreamSlice> {
        let new_slice = match &self.cursor {
            Some(cursor) => cursor.reduce_slice_range(original, self.most_recent.as_ref()),
            None => previous.clone(),
        };

        if &new_slice == previous {
            self.same_slice_attempts += 1;
            let allowed = if self.cursor.is_some() {
                MAX_SAME_SLICE_WITH_CURSOR
            } else {
                MAX_SAME_SLICE_WITHOUT_CURSOR
            };
            if self.same_slice_attempts >= allowed {
                return Err(Error::PaginationLoop {
                    slice: new_slice.key(),
                    attempts: self.same_slice_attempts,
                });
            }
            debug!(slice = %new_slice.key(), attempts = self.same_slice_attempts, "Retrying unchanged slice");
        } else {
            info!(from = %previous.key(), to = %new_slice.key(), "Narrowed slice after pagination reset");
            self.same_slice_attempts = 0;
        }

        self.record_count = 0;
        Ok(new_slice)
    }
}
