//! Engine types
//!
//! Messages emitted alongside records, and sync statistics.

use crate::types::{JsonValue, LogLevel, StreamStatus};
use serde::Serialize;

/// A message emitted during sync
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// State checkpoint
    State {
        /// Stream name
        stream: String,
        /// Cursor state after a partition closed
        data: JsonValue,
    },
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
    /// Stream lifecycle transition
    StreamStatus {
        /// Stream name
        stream: String,
        /// New status
        status: StreamStatus,
    },
}

impl Message {
    /// Create a state message
    pub fn state(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Create a stream status message
    pub fn status(stream: impl Into<String>, status: StreamStatus) -> Self {
        Self::StreamStatus {
            stream: stream.into(),
            status,
        }
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is a log message
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    /// Check if this is a stream status message
    pub fn is_status(&self) -> bool {
        matches!(self, Self::StreamStatus { .. })
    }
}

/// Statistics from reading one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records handed to the caller
    pub records_emitted: usize,
    /// Records the cursor filtered out as already synced
    pub records_skipped: usize,
    /// Partitions closed successfully
    pub partitions_closed: usize,
    /// Partitions that failed
    pub partitions_failed: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_emitted(&mut self) {
        self.records_emitted += 1;
    }

    pub(crate) fn add_skipped(&mut self) {
        self.records_skipped += 1;
    }

    pub(crate) fn add_closed(&mut self) {
        self.partitions_closed += 1;
    }

    pub(crate) fn add_failed(&mut self) {
        self.partitions_failed += 1;
    }

    pub(crate) fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
