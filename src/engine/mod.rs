//! Execution engine module
//!
//! Entry point for reading a stream end to end.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Loads resume state, generates partitions and starts the
//!   concurrent read
//! - `StreamRead` - The lazy record sequence of one stream
//! - Message types for the side channel (State, Log, StreamStatus)

mod repository;
mod types;

pub use repository::{InMemoryMessageRepository, MessageRepository};
pub use types::{Message, SyncStats};

use crate::async_job::{AsyncJobOrchestrator, AsyncJobRepository};
use crate::concurrent::{ConcurrentReader, QueueConsumer};
use crate::config::CoreConfig;
use crate::cursor::{Cursor, CursorField, StreamCursor};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig};
use crate::partition::{PartitionGenerator, Record};
use crate::state::StateManager;
use crate::types::{JsonValue, SyncMode};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::info;

/// Everything the engine needs to read one stream
pub struct StreamDefinition {
    /// Stream name
    pub name: String,
    /// Source of the stream's partitions
    pub generator: Arc<dyn PartitionGenerator>,
    /// Cursor variant chosen for the stream
    pub cursor: Cursor,
}

impl StreamDefinition {
    /// Define a stream named after its generator
    pub fn new(generator: Arc<dyn PartitionGenerator>, cursor: Cursor) -> Self {
        Self {
            name: generator.stream_name().to_string(),
            generator,
            cursor,
        }
    }
}

impl std::fmt::Debug for StreamDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDefinition")
            .field("name", &self.name)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

/// Sync engine for reading streams
pub struct SyncEngine {
    config: CoreConfig,
    reader: ConcurrentReader,
    state: Option<StateManager>,
    messages: Arc<dyn MessageRepository>,
}

impl SyncEngine {
    /// Create an engine; fails on an invalid configuration
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let reader = ConcurrentReader::new(config.concurrency.clone())?;
        let messages = Arc::new(InMemoryMessageRepository::new().with_log_level(config.log_level));
        Ok(Self {
            config,
            reader,
            state: None,
            messages,
        })
    }

    /// Persist cursor state through a state manager
    #[must_use]
    pub fn with_state_manager(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    /// Send side-channel messages somewhere else
    #[must_use]
    pub fn with_message_repository(mut self, messages: Arc<dyn MessageRepository>) -> Self {
        self.messages = messages;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Get the state manager
    pub fn state(&self) -> Option<&StateManager> {
        self.state.as_ref()
    }

    pub fn messages(&self) -> &Arc<dyn MessageRepository> {
        &self.messages
    }

    /// Per-partition cursor bounded by the configured state limit
    pub fn per_partition_cursor(&self, stream: impl Into<String>, field: CursorField) -> Cursor {
        Cursor::per_partition(stream, field, self.config.cursor.max_partition_states)
    }

    /// Orchestrator using the configured polling settings
    pub fn async_job_orchestrator(
        &self,
        stream: impl Into<String>,
        repository: Arc<dyn AsyncJobRepository>,
    ) -> AsyncJobOrchestrator {
        AsyncJobOrchestrator::new(stream, repository, self.config.async_job.clone())
    }

    /// HTTP client using the configured retry and rate limit behavior
    pub fn http_client(&self, base_url: impl Into<String>) -> Result<HttpClient> {
        let mut config = HttpClientConfig::from(&self.config.http);
        config.base_url = Some(base_url.into());
        HttpClient::with_config(config)
    }

    /// Start reading a stream.
    ///
    /// `state` overrides what the state manager holds for the stream. Full
    /// refresh ignores both.
    pub async fn read_stream(
        &self,
        definition: StreamDefinition,
        sync_mode: SyncMode,
        state: Option<JsonValue>,
    ) -> Result<StreamRead> {
        let StreamDefinition {
            name,
            generator,
            mut cursor,
        } = definition;
        if name != generator.stream_name() {
            return Err(Error::config(format!(
                "Stream '{name}' was defined with the generator of '{}'",
                generator.stream_name()
            )));
        }

        let state = match sync_mode {
            SyncMode::FullRefresh => None,
            SyncMode::Incremental => match (state, &self.state) {
                (Some(state), _) => Some(state),
                (None, Some(manager)) => manager.get_stream_state(&name).await,
                (None, None) => None,
            },
        };

        cursor.set_initial_state(state.as_ref())?;
        let partitions = generator.generate(sync_mode, state.as_ref())?;
        info!(stream = %name, ?sync_mode, resumed = state.is_some(), "Reading stream");

        let consumer = self.reader.read(
            &name,
            partitions,
            cursor,
            Arc::clone(&self.messages),
            self.state.clone(),
        );
        Ok(StreamRead { consumer })
    }

    /// Write the state manager's content to its file
    pub async fn save_state(&self) -> Result<()> {
        match &self.state {
            Some(manager) => manager.checkpoint().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("has_state_manager", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

/// Records of one stream, read lazily.
///
/// Ends with `None` on success, or with one error: the stream-scoped failure,
/// or a [`Error::PartialFailure`] listing the partitions that failed.
pub struct StreamRead {
    consumer: QueueConsumer,
}

impl StreamRead {
    /// Next record
    pub async fn next(&mut self) -> Option<Result<Record>> {
        self.consumer.next().await
    }

    /// Read everything, returning the records and the terminal error, if any
    pub async fn read_all(&mut self) -> (Vec<Record>, Option<Error>) {
        let mut records = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(record) => records.push(record),
                Err(e) => return (records, Some(e)),
            }
        }
        (records, None)
    }

    /// As a `futures` stream
    pub fn into_stream(self) -> BoxStream<'static, Result<Record>> {
        stream::unfold(self, |mut read| async move {
            let item = read.next().await?;
            Some((item, read))
        })
        .boxed()
    }

    /// Cursor state as of the last closed partition
    pub fn get_stream_state(&self) -> JsonValue {
        self.consumer.get_stream_state()
    }

    pub fn stats(&self) -> &SyncStats {
        self.consumer.stats()
    }

    pub fn stream_name(&self) -> &str {
        self.consumer.stream_name()
    }

    /// Stop claiming partitions; in-flight ones drain
    pub fn cancel(&self) {
        self.consumer.cancel();
    }
}

impl std::fmt::Debug for StreamRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRead")
            .field("stream", &self.stream_name())
            .field("stats", self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
