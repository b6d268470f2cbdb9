//! State management module
//!
//! Persists each stream's cursor state between sync runs so incremental syncs
//! resume where the last one stopped.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - Per-stream cursor state as opaque JSON
//! - `StateManager` - File-based state persistence with atomic writes

mod manager;
mod types;

pub use manager::StateManager;
pub use types::State;
