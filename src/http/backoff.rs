//! Backoff strategies
//!
//! Decide how long to wait before retrying a request, either from rate-limit
//! headers or from a constant/linear/exponential schedule.

use crate::config::{BackoffConfig, RateLimitConfig};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// First number found in a header value
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").unwrap());

/// Wait-before-retry computation
pub trait BackoffStrategy: Send + Sync {
    /// Wait before retry `attempt` (0-based). `None` means "no opinion".
    fn backoff_time(&self, headers: &HeaderMap, attempt: u32) -> Result<Option<Duration>>;
}

/// Read a header as seconds, optionally through a regex whose first capture
/// group (or whole match) holds the number.
fn header_seconds(headers: &HeaderMap, name: &str, regex: Option<&Regex>) -> Option<f64> {
    let raw = headers.get(name)?.to_str().ok()?.trim();
    let text = match regex {
        Some(re) => {
            let caps = re.captures(raw)?;
            caps.get(1).or_else(|| caps.get(0))?.as_str()
        }
        None => raw,
    };
    text.parse::<f64>()
        .ok()
        .or_else(|| NUMBER.find(text).and_then(|m| m.as_str().parse().ok()))
}

/// Waits too long for a `Duration` are refused like any other oversized wait
fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value.max(0.0)).map_err(|_| Error::BackoffExceeded {
        wait_seconds: value.ceil() as u64,
        max_seconds: Duration::MAX.as_secs(),
    })
}

// ============================================================================
// Wait Time From Header
// ============================================================================

/// Wait the number of seconds a header (e.g. `Retry-After`) asks for
#[derive(Debug, Clone)]
pub struct WaitTimeFromHeader {
    header: String,
    regex: Option<Regex>,
    min_wait: Option<f64>,
    max_wait: Option<f64>,
}

impl WaitTimeFromHeader {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            regex: None,
            min_wait: None,
            max_wait: None,
        }
    }

    /// Extract the number with a regex
    pub fn with_regex(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::invalid_value("backoff.regex", e.to_string()))?;
        self.regex = Some(regex);
        Ok(self)
    }

    /// Never wait less than `seconds`
    #[must_use]
    pub fn with_min_wait(mut self, seconds: f64) -> Self {
        self.min_wait = Some(seconds);
        self
    }

    /// Refuse waits of `seconds` or more
    #[must_use]
    pub fn with_max_wait(mut self, seconds: f64) -> Self {
        self.max_wait = Some(seconds);
        self
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            header: config.retry_after_header.clone(),
            regex: None,
            min_wait: config.min_wait_seconds,
            max_wait: config.max_wait_seconds,
        }
    }
}

impl BackoffStrategy for WaitTimeFromHeader {
    fn backoff_time(&self, headers: &HeaderMap, _attempt: u32) -> Result<Option<Duration>> {
        let Some(wait) = header_seconds(headers, &self.header, self.regex.as_ref()) else {
            return self.min_wait.map(seconds).transpose();
        };

        if let Some(max) = self.max_wait {
            if wait >= max {
                return Err(Error::BackoffExceeded {
                    wait_seconds: wait.ceil() as u64,
                    max_seconds: max as u64,
                });
            }
        }
        let wait = match self.min_wait {
            Some(min) => wait.max(min),
            None => wait,
        };
        seconds(wait).map(Some)
    }
}

// ============================================================================
// Wait Until Time From Header
// ============================================================================

/// Wait until the epoch second a header (e.g. `X-RateLimit-Reset`) names
#[derive(Debug, Clone)]
pub struct WaitUntilTimeFromHeader {
    header: String,
    regex: Option<Regex>,
    min_wait: Option<f64>,
}

impl WaitUntilTimeFromHeader {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            regex: None,
            min_wait: None,
        }
    }

    /// Extract the timestamp with a regex
    pub fn with_regex(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::invalid_value("backoff.regex", e.to_string()))?;
        self.regex = Some(regex);
        Ok(self)
    }

    /// Never wait less than `seconds`
    #[must_use]
    pub fn with_min_wait(mut self, seconds: f64) -> Self {
        self.min_wait = Some(seconds);
        self
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            header: config.reset_header.clone(),
            regex: None,
            min_wait: config.min_wait_seconds,
        }
    }

    /// Wait relative to `now` (epoch seconds)
    pub fn backoff_time_at(&self, headers: &HeaderMap, now: f64) -> Result<Option<Duration>> {
        let Some(reset_at) = header_seconds(headers, &self.header, self.regex.as_ref()) else {
            return self.min_wait.map(seconds).transpose();
        };

        let wait = reset_at - now;
        match self.min_wait {
            Some(min) if wait < min => seconds(min).map(Some),
            _ if wait < 0.0 => Ok(None),
            _ => seconds(wait).map(Some),
        }
    }
}

impl BackoffStrategy for WaitUntilTimeFromHeader {
    fn backoff_time(&self, headers: &HeaderMap, _attempt: u32) -> Result<Option<Duration>> {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.backoff_time_at(headers, now)
    }
}

// ============================================================================
// Retry Backoff
// ============================================================================

/// Header-independent schedule
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    backoff_type: BackoffType,
    initial: Duration,
    max: Duration,
}

impl RetryBackoff {
    pub fn new(backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        Self {
            backoff_type,
            initial,
            max,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config.backoff_type,
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
        )
    }

    /// Delay before retry `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.initial,
            BackoffType::Linear => self.initial.saturating_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => self.initial.saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max)
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffStrategy for RetryBackoff {
    fn backoff_time(&self, _headers: &HeaderMap, attempt: u32) -> Result<Option<Duration>> {
        Ok(Some(self.delay(attempt)))
    }
}
