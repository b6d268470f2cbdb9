//! # Solidafy Stream Core
//!
//! The read pipeline behind Solidafy connectors: partitioned streams read
//! concurrently, incremental cursors, and remote async jobs.
//!
//! ## Features
//!
//! - **Concurrent Reads**: A fixed worker pool drains partitions into one queue
//! - **Incremental Sync**: Simple, datetime and per-partition cursors
//! - **Async Jobs**: Create, poll and download remote export jobs
//! - **Rate Limits**: Header-driven backoff with a retry schedule fallback
//! - **Pagination Guards**: Loop detection and slice range narrowing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_stream_core::{Cursor, CoreConfig, StreamDefinition, SyncEngine, SyncMode};
//!
//! #[tokio::main]
//! async fn main() -> solidafy_stream_core::Result<()> {
//!     let engine = SyncEngine::new(CoreConfig::default())?;
//!     let definition = StreamDefinition::new(generator, Cursor::simple("events", "updated"));
//!
//!     let mut read = engine.read_stream(definition, SyncMode::Incremental, None).await?;
//!     while let Some(record) = read.next().await {
//!         let record = record?;
//!         // Process record
//!     }
//!     println!("state: {}", read.get_stream_state());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           SyncEngine                            │
//! │   resume state → PartitionGenerator → ConcurrentReader → Record │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │ Partition│  Cursor   │   Async Job   │   HTTP    │  Paginate   │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ List     │ Simple    │ Orchestrator  │ Retry     │ Loop guard  │
//! │ Datetime │ Datetime  │ Poll/timeout  │ Backoff   │ Range reduce│
//! │ Product  │ Partition │ HTTP protocol │ Rate limit│ Token guard │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: Document the cursor and partition types before 1.0

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Pipeline configuration
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Partitions, slices and generators
pub mod partition;

/// Incremental cursors
pub mod cursor;

/// Concurrent partition reader
pub mod concurrent;

/// Async job orchestration
pub mod async_job;

/// Pagination guards
pub mod pagination;

/// HTTP client with retry and rate limiting
pub mod http;

/// Response decoders
pub mod decode;

/// State management and checkpointing
pub mod state;

/// Main execution engine
pub mod engine;

/// Template interpolation
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::CoreConfig;
pub use cursor::{Cursor, CursorField, StreamCursor};
pub use engine::{Message, StreamDefinition, StreamRead, SyncEngine, SyncStats};
pub use error::{Error, ErrorKind, Result};
pub use partition::{Partition, PartitionGenerator, Record, StreamSlice};
pub use state::StateManager;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
