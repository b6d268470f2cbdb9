//! Partitions backed by completed async jobs

use super::orchestrator::AsyncJobOrchestrator;
use super::repository::AsyncJobRepository;
use super::types::AsyncJob;
use crate::error::Result;
use crate::partition::{
    validate_resume_state, Partition, PartitionGenerator, PartitionStream, RecordStream,
    SliceSource, StreamSlice,
};
use crate::types::{JsonObject, JsonValue, SyncMode};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The records of one completed job
pub struct AsyncJobPartition {
    stream: String,
    job: AsyncJob,
    repository: Arc<dyn AsyncJobRepository>,
}

impl AsyncJobPartition {
    pub fn new(stream: impl Into<String>, job: AsyncJob, repository: Arc<dyn AsyncJobRepository>) -> Self {
        Self {
            stream: stream.into(),
            job,
            repository,
        }
    }

    pub fn job(&self) -> &AsyncJob {
        &self.job
    }
}

impl Partition for AsyncJobPartition {
    fn stream_name(&self) -> &str {
        &self.stream
    }

    fn slice(&self) -> &StreamSlice {
        self.job.slice()
    }

    fn read(&self) -> RecordStream<'_> {
        stream::once(self.repository.fetch_records(&self.job))
            .flat_map(|fetched| {
                let items: Vec<Result<JsonObject>> = match fetched {
                    Ok(records) => records.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed()
    }
}

impl fmt::Debug for AsyncJobPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJobPartition")
            .field("stream", &self.stream)
            .field("job", &self.job)
            .finish_non_exhaustive()
    }
}

/// Generator whose partitions appear as their jobs complete
pub struct AsyncJobPartitionGenerator {
    stream: String,
    cursor_field: Option<String>,
    slicer: Arc<dyn SliceSource>,
    orchestrator: AsyncJobOrchestrator,
}

impl AsyncJobPartitionGenerator {
    pub fn new(
        stream: impl Into<String>,
        slicer: Arc<dyn SliceSource>,
        orchestrator: AsyncJobOrchestrator,
    ) -> Self {
        Self {
            stream: stream.into(),
            cursor_field: None,
            slicer,
            orchestrator,
        }
    }

    /// Field the stream is incrementally synced on
    #[must_use]
    pub fn with_cursor_field(mut self, field: impl Into<String>) -> Self {
        self.cursor_field = Some(field.into());
        self
    }
}

impl PartitionGenerator for AsyncJobPartitionGenerator {
    fn stream_name(&self) -> &str {
        &self.stream
    }

    fn generate(
        &self,
        sync_mode: SyncMode,
        resume_state: Option<&JsonValue>,
    ) -> Result<PartitionStream> {
        let resume_state = match sync_mode {
            SyncMode::FullRefresh => None,
            SyncMode::Incremental => resume_state,
        };
        if let Some(state) = resume_state {
            validate_resume_state(&self.stream, self.cursor_field.as_deref(), state)?;
        }

        let slices: Vec<StreamSlice> = self.slicer.slices(sync_mode, resume_state)?.collect();
        debug!(stream = %self.stream, jobs = slices.len(), "Submitting async jobs");

        let stream = self.stream.clone();
        let repository = Arc::clone(self.orchestrator.repository());
        let partitions = self
            .orchestrator
            .create_and_get_completed_jobs(slices)
            .map(move |completed| {
                completed.map(|job| {
                    let partition: Arc<dyn Partition> =
                        Arc::new(AsyncJobPartition::new(stream.clone(), job, Arc::clone(&repository)));
                    partition
                })
            });

        Ok(partitions.boxed())
    }
}
