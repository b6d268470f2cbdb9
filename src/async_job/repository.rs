//! Job repository seam

use super::types::AsyncJob;
use crate::error::Result;
use crate::partition::StreamSlice;
use crate::types::JsonObject;
use async_trait::async_trait;

/// Talks to the remote system that runs jobs.
///
/// The orchestrator owns job lifecycles; repositories only translate them
/// into API calls.
#[async_trait]
pub trait AsyncJobRepository: Send + Sync {
    /// Submit a job for a slice
    async fn start(&self, slice: StreamSlice) -> Result<AsyncJob>;

    /// Refresh the status of every job in place
    async fn update_jobs_status(&self, jobs: &mut [AsyncJob]) -> Result<()>;

    /// Download the records of a completed job.
    ///
    /// Fails with [`crate::Error::JobNotCompleted`] for any other status.
    async fn fetch_records(&self, job: &AsyncJob) -> Result<Vec<JsonObject>>;

    /// Cancel a job on the remote side, best effort
    async fn abort(&self, _job: &AsyncJob) -> Result<()> {
        Ok(())
    }
}
