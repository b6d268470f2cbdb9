//! Concurrent stream reader
//!
//! Reads a stream's partitions with a fixed pool of tokio tasks feeding one
//! unbounded queue, drained by a single [`QueueConsumer`].
//!
//! # Overview
//!
//! ```text
//! PartitionStream --(claimed under a mutex)--> worker 0..N
//!        worker: Record* PartitionComplete|PartitionFailed ... WorkerDone
//!                               |
//!                         mpsc queue --> QueueConsumer --> Record
//! ```
//!
//! The consumer stops after it has seen one `WorkerDone` per worker. A queue
//! that closes before that is a system error, naming the worker panic when
//! there was one.

mod consumer;
mod queue;
mod worker;

pub use consumer::QueueConsumer;

use crate::config::ConcurrencyConfig;
use crate::cursor::Cursor;
use crate::engine::{Message, MessageRepository};
use crate::error::Result;
use crate::partition::PartitionStream;
use crate::state::StateManager;
use crate::types::StreamStatus;
use futures::StreamExt;
use queue::EmissionClock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use worker::{spawn_workers, WorkerContext};


/// Worker pool reading partitions concurrently
#[derive(Debug, Clone)]
pub struct ConcurrentReader {
    config: ConcurrencyConfig,
}

impl ConcurrentReader {
    /// Create a reader; fails when `max_workers` is zero
    pub fn new(config: ConcurrencyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Number of workers per stream
    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// Start reading `partitions` and return the consumer draining them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn read(
        &self,
        stream: &str,
        partitions: PartitionStream,
        cursor: Cursor,
        messages: Arc<dyn MessageRepository>,
        state_manager: Option<StateManager>,
    ) -> QueueConsumer {
        let workers = self.config.max_workers;
        info!(stream, workers, "Starting concurrent read");
        messages.emit(Message::status(stream, StreamStatus::Started));

        let (sender, receiver) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        // Every worker polls the shared stream until it is exhausted
        let context = WorkerContext {
            partitions: Arc::new(Mutex::new(partitions.fuse().boxed())),
            sender,
            cancelled: Arc::clone(&cancelled),
            clock: Arc::new(EmissionClock::new()),
        };
        let handles = spawn_workers(workers, &context);
        // Only the workers hold senders from here on
        drop(context);

        QueueConsumer::new(
            stream.to_string(),
            receiver,
            workers,
            cursor,
            messages,
            state_manager,
            cancelled,
            handles,
        )
    }
}
