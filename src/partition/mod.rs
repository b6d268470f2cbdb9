//! Partition module
//!
//! Supports: single slice, static list, datetime windows, and products of
//! those, read through a connector-provided [`Stream`].
//!
//! # Overview
//!
//! A partition is one slice of a stream's data. Partitions are generated
//! lazily at sync start (or as async jobs complete), consumed exactly once by
//! a worker, and discarded once their records are drained. Generation does no
//! I/O; reading does.

mod generator;
mod slicers;
mod stream;
mod types;

pub use generator::{
    validate_resume_state, PartitionGenerator, PartitionStream, StreamPartitionGenerator,
};
pub use slicers::{
    parse_datetime, parse_datetime_value, parse_duration, DatetimeSlicer, ListSlicer,
    ProductSlicer, SingleSlice, SliceIter, SliceSource,
};
pub use stream::{Stream, StreamPartition};
pub use types::{Partition, PartitionKey, Record, RecordStream, StreamSlice};
