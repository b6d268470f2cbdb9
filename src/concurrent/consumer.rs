//! Queue consumer
//!
//! Drains the shared queue, turns raw entries into [`Record`]s, and owns the
//! stream's cursor: it filters records, tracks the most recent record per
//! partition, and closes slices as partitions complete.

use super::queue::QueueItem;
use crate::cursor::{Cursor, StreamCursor};
use crate::engine::{Message, MessageRepository, SyncStats};
use crate::error::{Error, Result};
use crate::partition::{PartitionKey, Record};
use crate::state::StateManager;
use crate::types::{JsonObject, JsonValue, LogLevel, StreamStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Single consumer of one stream's queue
pub struct QueueConsumer {
    stream: String,
    receiver: UnboundedReceiver<QueueItem>,
    expected_sentinels: usize,
    seen_sentinels: usize,
    cursor: Cursor,
    most_recent: HashMap<PartitionKey, JsonObject>,
    messages: Arc<dyn MessageRepository>,
    state_manager: Option<StateManager>,
    cancelled: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    failures: Vec<Error>,
    fatal: Option<Error>,
    stats: SyncStats,
    started: Instant,
    running: bool,
    finished: bool,
}

impl QueueConsumer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        stream: String,
        receiver: UnboundedReceiver<QueueItem>,
        expected_sentinels: usize,
        cursor: Cursor,
        messages: Arc<dyn MessageRepository>,
        state_manager: Option<StateManager>,
        cancelled: Arc<AtomicBool>,
        handles: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            stream,
            receiver,
            expected_sentinels,
            seen_sentinels: 0,
            cursor,
            most_recent: HashMap::new(),
            messages,
            state_manager,
            cancelled,
            handles,
            failures: Vec::new(),
            fatal: None,
            stats: SyncStats::default(),
            started: Instant::now(),
            running: false,
            finished: false,
        }
    }

    /// Next record, or the terminal error once the queue is drained.
    ///
    /// Returns `None` after every worker's sentinel was seen and nothing
    /// failed.
    pub async fn next(&mut self) -> Option<Result<Record>> {
        if self.finished {
            return None;
        }

        loop {
            let Some(item) = self.receiver.recv().await else {
                let closed = match self.worker_panic().await {
                    Some(panic) => panic,
                    None => Error::system(format!(
                        "Queue for stream '{}' closed after {} of {} workers finished",
                        self.stream, self.seen_sentinels, self.expected_sentinels
                    )),
                };
                self.fail_stream(closed);
                return self.finish();
            };

            match item {
                QueueItem::Record {
                    data,
                    partition,
                    emitted_at,
                } => {
                    let record = Record::new(data, partition, emitted_at);
                    if let Some(record) = self.accept(record) {
                        return Some(Ok(record));
                    }
                }
                QueueItem::PartitionComplete { partition, records } => {
                    let most_recent = self.most_recent.remove(&partition.key());
                    match self.cursor.close_slice(partition.slice(), most_recent.as_ref()) {
                        Ok(()) => {
                            self.stats.add_closed();
                            debug!(stream = %self.stream, slice = %partition.slice(), records, "Partition closed");
                            self.checkpoint().await;
                        }
                        Err(e) => self.fail_stream(e),
                    }
                }
                QueueItem::PartitionFailed { partition, error } => {
                    self.most_recent.remove(&partition.key());
                    self.stats.add_failed();
                    if error.is_partition_scoped() {
                        warn!(stream = %self.stream, error = %error, "Partition failed, continuing with the rest");
                        self.messages.log(LogLevel::Warn, error.to_string());
                        self.failures.push(error);
                    } else {
                        self.fail_stream(error);
                    }
                }
                QueueItem::GenerationFailed(error) if error.is_partition_scoped() => {
                    warn!(stream = %self.stream, error = %error, "Partition generation reported failures");
                    self.messages.log(LogLevel::Warn, error.to_string());
                    let failures = match error {
                        Error::PartialFailure { failures, .. } => failures,
                        other => vec![other],
                    };
                    for _ in &failures {
                        self.stats.add_failed();
                    }
                    self.failures.extend(failures);
                }
                QueueItem::GenerationFailed(error) => self.fail_stream(error),
                QueueItem::WorkerDone { worker_id } => {
                    self.seen_sentinels += 1;
                    debug!(
                        stream = %self.stream,
                        worker_id,
                        done = self.seen_sentinels,
                        of = self.expected_sentinels,
                        "Worker finished"
                    );
                    if self.seen_sentinels == self.expected_sentinels {
                        return self.finish();
                    }
                }
            }
        }
    }

    /// Stop workers from claiming new partitions
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Current cursor state
    pub fn get_stream_state(&self) -> JsonValue {
        self.cursor.get_stream_state()
    }

    /// The stream's cursor
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Counters so far
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Stream being consumed
    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    fn accept(&mut self, record: Record) -> Option<Record> {
        if !self.cursor.should_be_synced(&record) {
            self.stats.add_skipped();
            return None;
        }

        let key = record.partition().key();
        let newer = self
            .most_recent
            .get(&key)
            .map_or(true, |current| self.cursor.is_greater_than_or_equal(record.data(), current));
        if newer {
            self.most_recent.insert(key, record.data().clone());
        }

        if !self.running {
            self.running = true;
            self.messages
                .emit(Message::status(&self.stream, StreamStatus::Running));
        }
        self.stats.add_emitted();
        Some(record)
    }

    async fn checkpoint(&mut self) {
        let state = self.cursor.get_stream_state();
        self.messages.emit(Message::state(&self.stream, state.clone()));

        let Some(manager) = self.state_manager.clone() else {
            return;
        };
        if let Err(e) = manager.set_stream_state(&self.stream, state).await {
            self.fail_stream(e);
        }
    }

    /// Every sender is gone once the queue closes, so the workers have ended
    async fn worker_panic(&mut self) -> Option<Error> {
        let mut panic = None;
        for handle in self.handles.drain(..) {
            let Err(e) = handle.await else {
                continue;
            };
            if !e.is_panic() || panic.is_some() {
                continue;
            }
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            panic = Some(Error::system(format!(
                "A worker of stream '{}' panicked: {message}",
                self.stream
            )));
        }
        panic
    }

    /// Record a stream-scoped failure and stop claiming partitions. Queued
    /// records keep flowing until every worker has exited.
    fn fail_stream(&mut self, error: Error) {
        error!(stream = %self.stream, error = %error, "Stream failed");
        self.cancel();
        if self.fatal.is_none() {
            self.fatal = Some(error);
        } else {
            self.failures.push(error);
        }
    }

    fn finish(&mut self) -> Option<Result<Record>> {
        self.finished = true;
        self.stats
            .set_duration(self.started.elapsed().as_millis() as u64);
        for handle in self.handles.drain(..) {
            handle.abort();
        }

        let complete = self.fatal.is_none() && self.failures.is_empty();
        info!(
            stream = %self.stream,
            records = self.stats.records_emitted,
            skipped = self.stats.records_skipped,
            partitions = self.stats.partitions_closed,
            failed = self.stats.partitions_failed,
            duration_ms = self.stats.duration_ms,
            "Finished reading stream"
        );
        self.messages.emit(Message::info(format!(
            "Read {} records from stream '{}'",
            self.stats.records_emitted, self.stream
        )));
        let status = if complete {
            StreamStatus::Complete
        } else {
            StreamStatus::Incomplete
        };
        self.messages.emit(Message::status(&self.stream, status));

        if let Some(fatal) = self.fatal.take() {
            return Some(Err(fatal));
        }
        if self.failures.is_empty() {
            return None;
        }
        Some(Err(Error::PartialFailure {
            stream: self.stream.clone(),
            failures: std::mem::take(&mut self.failures),
        }))
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        self.cancel();
    }
}
