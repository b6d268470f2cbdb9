//! HTTP client module
//!
//! Provides the requester used by async job repositories, with retry and
//! backoff strategies.
//!
//! # Features
//!
//! - **Automatic Retries**: Configurable retry logic with backoff
//! - **Header Backoff**: `Retry-After` waits and reset timestamps
//! - **Ignorable Statuses**: answered with `None` instead of an error

mod backoff;
mod client;

pub use backoff::{BackoffStrategy, RetryBackoff, WaitTimeFromHeader, WaitUntilTimeFromHeader};
pub use client::{
    HttpClient, HttpClientConfig, HttpClientConfigBuilder, LogFormatter, RequestConfig, Requester,
};

#[cfg(test)]
mod tests;
