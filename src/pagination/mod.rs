//! Pagination safety nets
//!
//! # Overview
//!
//! Page-fetching itself belongs to each stream. This module keeps pagination
//! from running forever:
//! - [`PaginationTracker`] narrows a slice when a read restarts and fails fast
//!   when the slice stops changing
//! - [`PaginationGuard`] stops when two consecutive tokens are equal

mod token;
mod tracker;

pub use token::PaginationGuard;
pub use tracker::PaginationTracker;
