//! Worker pool
//!
//! Each worker claims the next partition from the shared partition stream,
//! queues its records, then a completion marker. When the stream runs dry or
//! the sync is cancelled it queues exactly one sentinel and exits.

use super::queue::{EmissionClock, QueueItem};
use crate::error::Error;
use crate::partition::{Partition, PartitionStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// State shared by every worker of one stream
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) partitions: Arc<Mutex<PartitionStream>>,
    pub(crate) sender: UnboundedSender<QueueItem>,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) clock: Arc<EmissionClock>,
}

/// Spawn `count` workers on the current runtime
pub(crate) fn spawn_workers(count: usize, context: &WorkerContext) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| tokio::spawn(run_worker(worker_id, context.clone())))
        .collect()
}

async fn run_worker(worker_id: usize, context: WorkerContext) {
    debug!(worker_id, "Worker started");

    loop {
        if context.cancelled.load(Ordering::Acquire) {
            debug!(worker_id, "Sync cancelled, worker stops claiming partitions");
            break;
        }

        // Claim under the lock; read outside it
        let next = context.partitions.lock().await.next().await;
        let keep_going = match next {
            None => break,
            Some(Ok(partition)) => read_partition(worker_id, partition, &context).await,
            Some(Err(error)) => {
                // Partition-scoped failures (a job that exhausted its attempts)
                // leave the rest of the sequence intact
                let scoped = error.is_partition_scoped();
                context.sender.send(QueueItem::GenerationFailed(error)).is_ok() && scoped
            }
        };
        if !keep_going {
            break;
        }
    }

    if context.sender.send(QueueItem::WorkerDone { worker_id }).is_err() {
        debug!(worker_id, "Consumer went away before the worker finished");
    }
}

/// Queue every record of one partition. Returns false once the consumer is gone.
async fn read_partition(worker_id: usize, partition: Arc<dyn Partition>, context: &WorkerContext) -> bool {
    debug!(worker_id, stream = partition.stream_name(), slice = %partition.slice(), "Reading partition");

    let mut records = 0usize;
    let mut failure = None;
    {
        let mut stream = partition.read();
        while let Some(item) = stream.next().await {
            match item {
                Ok(data) => {
                    let queued = QueueItem::Record {
                        data,
                        partition: Arc::clone(&partition),
                        emitted_at: context.clock.next(),
                    };
                    if context.sender.send(queued).is_err() {
                        return false;
                    }
                    records += 1;
                }
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }
    }

    let terminal = match failure {
        Some(error) => {
            warn!(
                worker_id,
                stream = partition.stream_name(),
                slice = %partition.slice(),
                error = %error,
                "Partition read failed"
            );
            let error = Error::partition(partition.stream_name(), partition.slice().key(), error);
            QueueItem::PartitionFailed { partition, error }
        }
        None => QueueItem::PartitionComplete { partition, records },
    };
    context.sender.send(terminal).is_ok()
}
