//! Error types for the stream core
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Errors fall into four families (see [`ErrorKind`]):
//! - **Configuration**: bad worker count, bad resume state. Never retried.
//! - **Transient**: rate limits, timeouts. Retried with backoff, then reported
//!   per partition.
//! - **System**: pagination loops, cursor misuse, reading a job before it
//!   completed. Fails the whole stream.
//! - **PartialFailure**: one partition or job failed after its retries; the
//!   sync carries on and reports it at the end.

use thiserror::Error;

/// Broad classification used to decide how far an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or resume state, surfaced immediately
    Configuration,
    /// Rate limits and timeouts, retryable
    Transient,
    /// Implementation bug or unexpected API behavior, fails the stream
    System,
    /// A partition or job failed but siblings continue
    PartialFailure,
}

/// The main error type for the stream core
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Resume state for stream '{stream}' references unknown cursor field '{field}'")]
    UnknownCursorField { stream: String, field: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Transient Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error(
        "Rate limit wait of {wait_seconds}s exceeds the {max_seconds}s ceiling, resume on the next sync"
    )]
    BackoffExceeded { wait_seconds: u64, max_seconds: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // System Errors
    // ============================================================================
    #[error("System error: {message}")]
    System { message: String },

    #[error("Pagination loop detected: slice {slice} was not narrowed after {attempts} attempt(s)")]
    PaginationLoop { slice: String, attempts: usize },

    #[error("Async job '{job_id}' is {status}, records can only be fetched once it completed")]
    JobNotCompleted { job_id: String, status: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("State error: {message}")]
    State { message: String },

    // ============================================================================
    // Partition Errors
    // ============================================================================
    #[error("Partition {partition} of stream '{stream}' failed: {source}")]
    Partition {
        stream: String,
        partition: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Async job '{job_id}' for slice {slice} ended as {status}")]
    AsyncJobFailed {
        job_id: String,
        slice: String,
        status: String,
    },

    #[error("Stream '{stream}' finished with {} failed partition(s): {}", .failures.len(), summarize(.failures))]
    PartialFailure { stream: String, failures: Vec<Error> },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    /// Connector-side failure without a dedicated variant
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

fn summarize(failures: &[Error]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a system error
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Wrap an error with the identity of the partition that raised it
    pub fn partition(stream: impl Into<String>, partition: impl Into<String>, source: Error) -> Self {
        Self::Partition {
            stream: stream.into(),
            partition: partition.into(),
            source: Box::new(source),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::InvalidConfigValue { .. }
            | Error::UnknownCursorField { .. }
            | Error::YamlParse(_) => ErrorKind::Configuration,
            Error::Http(_)
            | Error::RateLimited { .. }
            | Error::Timeout { .. }
            | Error::MaxRetriesExceeded { .. }
            | Error::BackoffExceeded { .. } => ErrorKind::Transient,
            Error::HttpStatus { status, .. } if is_retryable_status(*status) => {
                ErrorKind::Transient
            }
            Error::AsyncJobFailed { .. } | Error::PartialFailure { .. } => {
                ErrorKind::PartialFailure
            }
            Error::Partition { source, .. } => source.kind(),
            _ => ErrorKind::System,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            Error::Partition { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether the failure only affects the partition that raised it.
    ///
    /// Transient errors that survived their retries and partial failures are
    /// scoped to one partition; everything else aborts the stream.
    pub fn is_partition_scoped(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::PartialFailure
        )
    }
}

/// Check if an HTTP status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(
        status,
        429 | 500 | 502 | 503 | 504 | 520 | 521 | 522 | 523 | 524
    )
}

/// Result type alias for the stream core
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("max_workers must be at least 1");
        assert_eq!(
            err.to_string(),
            "Configuration error: max_workers must be at least 1"
        );

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");

        let err = Error::partition("orders", r#"{"page":3}"#, Error::system("boom"));
        assert_eq!(
            err.to_string(),
            r#"Partition {"page":3} of stream 'orders' failed: System error: boom"#
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::RateLimited {
                retry_after_seconds: 5
            }
            .kind(),
            ErrorKind::Transient
        );
        assert_eq!(Error::http_status(503, "").kind(), ErrorKind::Transient);
        assert_eq!(Error::http_status(400, "").kind(), ErrorKind::System);
        assert_eq!(
            Error::PaginationLoop {
                slice: "{}".into(),
                attempts: 1
            }
            .kind(),
            ErrorKind::System
        );
        assert_eq!(
            Error::AsyncJobFailed {
                job_id: "j".into(),
                slice: "{}".into(),
                status: "failed".into()
            }
            .kind(),
            ErrorKind::PartialFailure
        );
    }

    #[test]
    fn test_partition_error_inherits_kind() {
        let wrapped = Error::partition("s", "p", Error::Timeout { timeout_ms: 10 });
        assert_eq!(wrapped.kind(), ErrorKind::Transient);
        assert!(wrapped.is_partition_scoped());
        assert!(wrapped.is_retryable());

        let wrapped = Error::partition("s", "p", Error::system("bug"));
        assert!(!wrapped.is_partition_scoped());
    }

    #[test]
    fn test_connector_errors_fail_the_stream() {
        let err: Error = anyhow::anyhow!("unexpected payload shape").into();
        assert_eq!(err.to_string(), "unexpected payload shape");
        assert_eq!(err.kind(), ErrorKind::System);
        assert!(!err.is_partition_scoped());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited {
            retry_after_seconds: 60
        }
        .is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::http_status(429, "").is_retryable());
        assert!(Error::http_status(500, "").is_retryable());

        assert!(!Error::http_status(400, "").is_retryable());
        assert!(!Error::http_status(404, "").is_retryable());
        assert!(!Error::config("test").is_retryable());
    }

    #[test]
    fn test_partial_failure_display() {
        let err = Error::PartialFailure {
            stream: "exports".into(),
            failures: vec![Error::AsyncJobFailed {
                job_id: "job-2".into(),
                slice: r#"{"day":"2"}"#.into(),
                status: "failed".into(),
            }],
        };
        let text = err.to_string();
        assert!(text.starts_with("Stream 'exports' finished with 1 failed partition(s)"));
        assert!(text.contains("job-2"));
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
