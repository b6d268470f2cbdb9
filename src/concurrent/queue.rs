//! Queue protocol between workers and the consumer

use crate::error::Error;
use crate::partition::Partition;
use crate::types::JsonObject;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// One entry on the shared queue
#[derive(Debug)]
pub(crate) enum QueueItem {
    /// A raw record read from a partition
    Record {
        data: JsonObject,
        partition: Arc<dyn Partition>,
        emitted_at: i64,
    },
    /// Every record of the partition has been queued
    PartitionComplete {
        partition: Arc<dyn Partition>,
        records: usize,
    },
    /// Terminal entry for a partition whose read failed
    PartitionFailed {
        partition: Arc<dyn Partition>,
        error: Error,
    },
    /// The partition generator itself failed
    GenerationFailed(Error),
    /// Sentinel: the worker claimed its last partition and exited
    WorkerDone { worker_id: usize },
}

/// Millisecond timestamps that strictly increase across all workers
#[derive(Debug, Default)]
pub(crate) struct EmissionClock {
    last: AtomicI64,
}

impl EmissionClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `max(now, previous + 1)`
    pub(crate) fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}
