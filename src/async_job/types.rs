//! Async job types

use crate::decode::{extract_path, DecoderFormat};
use crate::partition::StreamSlice;
use crate::types::JsonValue;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Job Status
// ============================================================================

/// Lifecycle of a remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncJobStatus {
    /// Submitted, not yet seen running
    Created,
    /// Running on the remote side
    Running,
    /// Results are ready to download
    Completed,
    /// The remote side gave up
    Failed,
    /// Ran longer than the job timeout
    TimedOut,
}

impl AsyncJobStatus {
    /// No further transitions happen from here
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Whether the job still counts against the concurrency limit
    pub fn is_running(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl fmt::Display for AsyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Job
// ============================================================================

/// A job created for one slice
#[derive(Debug, Clone)]
pub struct AsyncJob {
    api_job_id: String,
    slice: StreamSlice,
    status: AsyncJobStatus,
    started_at: Instant,
}

impl AsyncJob {
    /// Track a job the remote side just accepted
    pub fn new(api_job_id: impl Into<String>, slice: StreamSlice) -> Self {
        Self {
            api_job_id: api_job_id.into(),
            slice,
            status: AsyncJobStatus::Created,
            started_at: Instant::now(),
        }
    }

    /// Job id assigned by the remote system
    pub fn api_job_id(&self) -> &str {
        &self.api_job_id
    }

    pub fn slice(&self) -> &StreamSlice {
        &self.slice
    }

    pub fn status(&self) -> AsyncJobStatus {
        self.status
    }

    /// Record a status observed on the remote side.
    ///
    /// Terminal statuses are sticky.
    pub fn update_status(&mut self, status: AsyncJobStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }

    /// Time since the job was created
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether a running job has exceeded `timeout`
    pub fn has_timed_out(&self, timeout: Duration) -> bool {
        self.status.is_running() && self.elapsed() >= timeout
    }
}

// ============================================================================
// HTTP Job Protocol
// ============================================================================

/// Create → poll → download protocol of a job API.
///
/// Paths and the create body may use `{{ job_id }}`, `{{ slice.<key> }}` and
/// `{{ config.<key> }}` placeholders.
#[derive(Debug, Clone)]
pub struct AsyncJobConfig {
    /// HTTP method for job creation (POST, PUT)
    pub create_method: String,
    /// Endpoint path for job creation
    pub create_path: String,
    /// Request body for job creation
    pub create_body: Option<JsonValue>,
    /// Path to the job id in the creation response
    pub job_id_path: String,

    /// Endpoint path for polling job status
    pub poll_path: String,
    /// Path to the status in the poll response
    pub status_path: String,
    /// Status value meaning the job completed
    pub completed_value: String,
    /// Status values meaning the job failed
    pub failed_values: Vec<String>,

    /// Endpoint path for downloading results
    pub download_path: String,
    /// Format of the download body
    pub download_format: DecoderFormat,
    /// Path to the records in the download response
    pub records_path: Option<String>,

    /// Endpoint path to cancel a job, if the API has one
    pub abort_path: Option<String>,
}

impl Default for AsyncJobConfig {
    fn default() -> Self {
        Self {
            create_method: "POST".to_string(),
            create_path: String::new(),
            create_body: None,
            job_id_path: "id".to_string(),
            poll_path: String::new(),
            status_path: "state".to_string(),
            completed_value: "JobComplete".to_string(),
            failed_values: vec!["Failed".to_string(), "Aborted".to_string()],
            download_path: String::new(),
            download_format: DecoderFormat::Json,
            records_path: None,
            abort_path: None,
        }
    }
}

impl AsyncJobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set job creation config
    #[must_use]
    pub fn with_create(mut self, method: &str, path: &str, body: Option<JsonValue>) -> Self {
        self.create_method = method.to_string();
        self.create_path = path.to_string();
        self.create_body = body;
        self
    }

    /// Set job ID extraction path
    #[must_use]
    pub fn with_job_id_path(mut self, path: &str) -> Self {
        self.job_id_path = path.to_string();
        self
    }

    /// Set polling config
    #[must_use]
    pub fn with_poll(mut self, path: &str) -> Self {
        self.poll_path = path.to_string();
        self
    }

    /// Set status checking config
    #[must_use]
    pub fn with_status(mut self, path: &str, completed: &str, failed: Vec<&str>) -> Self {
        self.status_path = path.to_string();
        self.completed_value = completed.to_string();
        self.failed_values = failed.into_iter().map(String::from).collect();
        self
    }

    /// Set download config
    #[must_use]
    pub fn with_download(
        mut self,
        path: &str,
        format: DecoderFormat,
        records_path: Option<&str>,
    ) -> Self {
        self.download_path = path.to_string();
        self.download_format = format;
        self.records_path = records_path.map(String::from);
        self
    }

    /// Set the cancel endpoint
    #[must_use]
    pub fn with_abort(mut self, path: &str) -> Self {
        self.abort_path = Some(path.to_string());
        self
    }

    /// Interpret a poll response
    pub fn status_of(&self, response: &JsonValue) -> AsyncJobStatus {
        let status = extract_path(response, &self.status_path)
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();

        if status == self.completed_value {
            AsyncJobStatus::Completed
        } else if self.failed_values.contains(&status) {
            AsyncJobStatus::Failed
        } else {
            AsyncJobStatus::Running
        }
    }
}
