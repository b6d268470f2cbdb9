//! Async job orchestration
//!
//! Submits one job per slice, polls running jobs on a fixed interval and
//! yields each job as soon as it completes. Failed and timed-out jobs are
//! retried up to the attempt budget; what still fails is reported once, after
//! every successful job has been yielded.

use super::repository::AsyncJobRepository;
use super::types::{AsyncJob, AsyncJobStatus};
use crate::config::AsyncJobSettings;
use crate::error::{Error, Result};
use crate::partition::StreamSlice;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A slice waiting to be submitted, with the attempt it will be
#[derive(Debug)]
struct PendingSlice {
    slice: StreamSlice,
    attempt: u32,
}

/// A submitted job and the attempt it belongs to
#[derive(Debug)]
struct RunningJob {
    job: AsyncJob,
    attempt: u32,
}

/// Drives jobs from submission to completion
#[derive(Clone)]
pub struct AsyncJobOrchestrator {
    stream: String,
    repository: Arc<dyn AsyncJobRepository>,
    settings: AsyncJobSettings,
}

impl AsyncJobOrchestrator {
    pub fn new(
        stream: impl Into<String>,
        repository: Arc<dyn AsyncJobRepository>,
        settings: AsyncJobSettings,
    ) -> Self {
        Self {
            stream: stream.into(),
            repository,
            settings,
        }
    }

    pub fn repository(&self) -> &Arc<dyn AsyncJobRepository> {
        &self.repository
    }

    /// Lazily run jobs for `slices`, yielding completed jobs.
    ///
    /// The last item is a [`Error::PartialFailure`] when any slice exhausted
    /// its attempts. A stream-scoped error ends the sequence immediately.
    pub fn create_and_get_completed_jobs<I>(&self, slices: I) -> BoxStream<'static, Result<AsyncJob>>
    where
        I: IntoIterator<Item = StreamSlice>,
    {
        let run = JobRun {
            stream: self.stream.clone(),
            repository: Arc::clone(&self.repository),
            settings: self.settings.clone(),
            pending: slices
                .into_iter()
                .map(|slice| PendingSlice { slice, attempt: 1 })
                .collect(),
            running: Vec::new(),
            ready: VecDeque::new(),
            failures: Vec::new(),
            finished: false,
        };

        stream::unfold(run, |mut run| async move {
            let item = run.next_job().await?;
            Some((item, run))
        })
        .boxed()
    }
}

impl std::fmt::Debug for AsyncJobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncJobOrchestrator")
            .field("stream", &self.stream)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// State of one orchestration. Polling is single-threaded: one pass walks
/// every running job.
struct JobRun {
    stream: String,
    repository: Arc<dyn AsyncJobRepository>,
    settings: AsyncJobSettings,
    pending: VecDeque<PendingSlice>,
    running: Vec<RunningJob>,
    ready: VecDeque<AsyncJob>,
    failures: Vec<Error>,
    finished: bool,
}

impl JobRun {
    async fn next_job(&mut self) -> Option<Result<AsyncJob>> {
        loop {
            if let Some(job) = self.ready.pop_front() {
                return Some(Ok(job));
            }
            if self.finished {
                return None;
            }
            if self.pending.is_empty() && self.running.is_empty() {
                self.finished = true;
                if self.failures.is_empty() {
                    return None;
                }
                return Some(Err(Error::PartialFailure {
                    stream: self.stream.clone(),
                    failures: std::mem::take(&mut self.failures),
                }));
            }

            if let Err(e) = self.submit_pending().await {
                return Some(Err(self.abort_all(e).await));
            }
            if self.running.is_empty() {
                // Only failed starts are left; wait before submitting them again
                if !self.pending.is_empty() {
                    tokio::time::sleep(self.settings.poll_interval()).await;
                }
                continue;
            }

            tokio::time::sleep(self.settings.poll_interval()).await;
            if let Err(e) = self.poll_running().await {
                return Some(Err(self.abort_all(e).await));
            }
        }
    }

    /// Start pending slices while below the concurrency limit
    async fn submit_pending(&mut self) -> Result<()> {
        while self.running.len() < self.settings.max_concurrent_jobs {
            let Some(PendingSlice { slice, attempt }) = self.pending.pop_front() else {
                break;
            };

            match self.repository.start(slice.clone()).await {
                Ok(job) => {
                    debug!(
                        stream = %self.stream,
                        job_id = %job.api_job_id(),
                        slice = %slice,
                        attempt,
                        "Started async job"
                    );
                    self.running.push(RunningJob { job, attempt });
                }
                Err(e) if e.is_partition_scoped() => {
                    let failure = Error::partition(&self.stream, slice.key(), e);
                    self.retry_or_fail(slice, attempt, failure);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// One poll pass over every running job
    async fn poll_running(&mut self) -> Result<()> {
        let mut jobs: Vec<AsyncJob> = self.running.iter().map(|r| r.job.clone()).collect();
        match self.repository.update_jobs_status(&mut jobs).await {
            Ok(()) => {}
            // Timeouts still apply below, so a flapping API cannot stall the run
            Err(e) if e.is_partition_scoped() => {
                warn!(stream = %self.stream, error = %e, "Polling async jobs failed, retrying next pass");
                jobs = self.running.iter().map(|r| r.job.clone()).collect();
            }
            Err(e) => return Err(e),
        }

        let timeout = self.settings.job_timeout();
        let running = std::mem::take(&mut self.running);
        for (tracked, mut job) in running.into_iter().zip(jobs) {
            if job.has_timed_out(timeout) {
                job.update_status(AsyncJobStatus::TimedOut);
            }

            match job.status() {
                AsyncJobStatus::Completed => {
                    info!(
                        stream = %self.stream,
                        job_id = %job.api_job_id(),
                        elapsed_ms = job.elapsed().as_millis() as u64,
                        "Async job completed"
                    );
                    self.ready.push_back(job);
                }
                AsyncJobStatus::Failed => {
                    warn!(stream = %self.stream, job_id = %job.api_job_id(), attempt = tracked.attempt, "Async job failed");
                    self.job_failed(job, tracked.attempt);
                }
                AsyncJobStatus::TimedOut => {
                    warn!(
                        stream = %self.stream,
                        job_id = %job.api_job_id(),
                        timeout_secs = timeout.as_secs(),
                        attempt = tracked.attempt,
                        "Async job timed out"
                    );
                    if let Err(e) = self.repository.abort(&job).await {
                        debug!(job_id = %job.api_job_id(), error = %e, "Could not abort timed-out job");
                    }
                    self.job_failed(job, tracked.attempt);
                }
                AsyncJobStatus::Created | AsyncJobStatus::Running => {
                    self.running.push(RunningJob {
                        job,
                        attempt: tracked.attempt,
                    });
                }
            }
        }
        Ok(())
    }

    fn job_failed(&mut self, job: AsyncJob, attempt: u32) {
        let failure = Error::AsyncJobFailed {
            job_id: job.api_job_id().to_string(),
            slice: job.slice().key(),
            status: job.status().to_string(),
        };
        self.retry_or_fail(job.slice().clone(), attempt, failure);
    }

    fn retry_or_fail(&mut self, slice: StreamSlice, attempt: u32, failure: Error) {
        if attempt < self.settings.max_attempts {
            info!(
                stream = %self.stream,
                slice = %slice,
                attempt = attempt + 1,
                "Retrying async job"
            );
            self.pending.push_back(PendingSlice {
                slice,
                attempt: attempt + 1,
            });
        } else {
            error!(stream = %self.stream, slice = %slice, error = %failure, "Async job attempts exhausted");
            self.failures.push(failure);
        }
    }

    /// Stop every running job and surface `cause`
    async fn abort_all(&mut self, cause: Error) -> Error {
        error!(stream = %self.stream, error = %cause, "Aborting async jobs");
        for tracked in std::mem::take(&mut self.running) {
            if let Err(e) = self.repository.abort(&tracked.job).await {
                debug!(job_id = %tracked.job.api_job_id(), error = %e, "Could not abort job");
            }
        }
        self.pending.clear();
        self.ready.clear();
        self.failures.clear();
        self.finished = true;
        cause
    }
}
