//! Configuration types for the stream core
//!
//! Every knob of the read pipeline lives here: worker pool size, async job
//! polling, retry backoff and HTTP behavior. Configs can be loaded from YAML
//! or JSON and are validated before a sync starts.

use crate::error::{Error, Result};
use crate::types::{BackoffType, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cores kept free for the consumer and the runtime when sizing the pool
const RESERVED_CONSUMER_THREADS: usize = 2;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete configuration for the read pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Worker pool configuration
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Async job orchestration configuration
    #[serde(default)]
    pub async_job: AsyncJobSettings,

    /// Cursor bookkeeping limits
    #[serde(default)]
    pub cursor: CursorSettings,

    /// HTTP client configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Minimum log level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl CoreConfig {
    /// Parse a config from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {e}", path.display())))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.concurrency.validate()?;
        self.async_job.validate()?;
        self.cursor.validate()?;
        self.http.validate()
    }
}

// ============================================================================
// Concurrency Config
// ============================================================================

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Number of workers reading partitions in parallel
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

fn default_max_workers() -> usize {
    8
}

impl ConcurrencyConfig {
    /// Create a config with an explicit worker count
    pub fn new(max_workers: usize) -> Self {
        Self { max_workers }
    }

    /// Size the pool from the machine, keeping a couple of cores for the
    /// consumer side so partition generation never starves.
    pub fn recommended() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(cores.saturating_sub(RESERVED_CONSUMER_THREADS).max(1))
    }

    /// Set the worker count
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Reject pools that could never make progress
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::invalid_value(
                "max_workers",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Async Job Settings
// ============================================================================

/// Async job orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncJobSettings {
    /// Maximum number of jobs running on the remote side at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Seconds between two poll passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Seconds a job may stay running before it is timed out
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,

    /// Attempts per slice before the failure is reported
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AsyncJobSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            poll_interval_seconds: default_poll_interval(),
            job_timeout_seconds: default_job_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    10
}

fn default_poll_interval() -> u64 {
    5
}

fn default_job_timeout() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    3
}

impl AsyncJobSettings {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Job timeout as a duration
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }

    /// Set the concurrent job limit
    #[must_use]
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    /// Set the per-job timeout
    #[must_use]
    pub fn with_job_timeout(mut self, seconds: u64) -> Self {
        self.job_timeout_seconds = seconds;
        self
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(Error::invalid_value(
                "async_job.max_concurrent_jobs",
                "must be at least 1",
            ));
        }
        if self.poll_interval_seconds == 0 {
            return Err(Error::invalid_value(
                "async_job.poll_interval_seconds",
                "must be at least 1",
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::invalid_value(
                "async_job.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Cursor Settings
// ============================================================================

/// Cursor bookkeeping limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorSettings {
    /// Per-partition states retained before the oldest is evicted
    #[serde(default = "default_max_partition_states")]
    pub max_partition_states: usize,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self {
            max_partition_states: default_max_partition_states(),
        }
    }
}

fn default_max_partition_states() -> usize {
    10_000
}

impl CursorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_partition_states == 0 {
            return Err(Error::invalid_value(
                "cursor.max_partition_states",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Statuses answered with "no response" instead of an error
    #[serde(default)]
    pub ignore_statuses: Vec<u16>,

    /// Retry backoff configuration
    #[serde(default)]
    pub retry_backoff: BackoffConfig,

    /// Rate limit header handling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            ignore_statuses: Vec::new(),
            retry_backoff: BackoffConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

impl HttpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            return Err(Error::invalid_value(
                "http.timeout_seconds",
                "must be at least 1",
            ));
        }
        if let (Some(min), Some(max)) = (
            self.rate_limit.min_wait_seconds,
            self.rate_limit.max_wait_seconds,
        ) {
            if min > max {
                return Err(Error::invalid_value(
                    "http.rate_limit",
                    format!("min_wait_seconds ({min}) exceeds max_wait_seconds ({max})"),
                ));
            }
        }
        Ok(())
    }
}

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_initial_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    60000
}

/// Rate limit header configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Header carrying a wait time in seconds
    #[serde(default = "default_retry_after_header")]
    pub retry_after_header: String,

    /// Header carrying the epoch second at which the limit resets
    #[serde(default = "default_reset_header")]
    pub reset_header: String,

    /// Lower bound applied to any header-derived wait
    #[serde(default)]
    pub min_wait_seconds: Option<f64>,

    /// Waits above this abort the request so the next sync can resume
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: Option<f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            retry_after_header: default_retry_after_header(),
            reset_header: default_reset_header(),
            min_wait_seconds: None,
            max_wait_seconds: default_max_wait(),
        }
    }
}

fn default_retry_after_header() -> String {
    "Retry-After".to_string()
}

fn default_reset_header() -> String {
    "X-RateLimit-Reset".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_wait() -> Option<f64> {
    Some(600.0)
}
