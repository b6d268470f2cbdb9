//! Async job module
//!
//! Streams whose data comes from remote jobs (bulk exports, report
//! generation) follow create → poll → download instead of request → parse.
//!
//! # Overview
//!
//! ```text
//! slices -> AsyncJobOrchestrator -> completed jobs -> AsyncJobPartition
//!              (submit, poll, retry)                    (download records)
//! ```
//!
//! Job states: `Created -> Running -> {Completed, Failed, TimedOut}`.

mod http;
mod orchestrator;
mod partition;
mod repository;
mod types;

pub use http::HttpJobRepository;
pub use orchestrator::AsyncJobOrchestrator;
pub use partition::{AsyncJobPartition, AsyncJobPartitionGenerator};
pub use repository::AsyncJobRepository;
pub use types::{AsyncJob, AsyncJobConfig, AsyncJobStatus};

#[cfg(test)]
mod tests;
