//! Response decoder module
//!
//! Supports: JSON, JSONL
//!
//! # Overview
//!
//! Decoders turn response bodies into records. Each decoder extracts records
//! from the body using an optional dot path.

mod decoders;
mod types;

pub use decoders::{decoder_for, extract_path, JsonDecoder, JsonlDecoder};
pub use types::{Decoder, DecoderFormat};

#[cfg(test)]
mod tests;
