//! Message repository
//!
//! Side channel for state, log and status messages produced while records
//! flow to the caller.

use super::types::Message;
use crate::types::LogLevel;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Sink for non-record messages
pub trait MessageRepository: Send + Sync {
    /// Store a message
    fn emit(&self, message: Message);

    /// Take every message emitted so far, oldest first
    fn drain(&self) -> Vec<Message>;

    /// Store a log message
    fn log(&self, level: LogLevel, message: String) {
        self.emit(Message::log(level, message));
    }
}

/// Message repository backed by an in-memory queue
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    messages: Mutex<VecDeque<Message>>,
    log_level: LogLevel,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop log messages below `level`
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Number of messages waiting
    pub fn len(&self) -> usize {
        self.messages.lock().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn emit(&self, message: Message) {
        if let Message::Log { level, .. } = &message {
            if *level < self.log_level {
                return;
            }
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push_back(message);
        }
    }

    fn drain(&self) -> Vec<Message> {
        self.messages
            .lock()
            .map(|mut m| m.drain(..).collect())
            .unwrap_or_default()
    }
}
