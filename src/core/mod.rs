//! Core primitives: domain types, errors, decimal parsing, stable
//! hashing, fixed-point quantization, and ingest policy configuration.

pub mod config;
pub mod decimal;
pub mod error;
pub mod hashing;
pub mod quantizer;
pub mod types;

pub use config::{FailurePolicy, QuarantineAction};
pub use decimal::parse_decimal;
pub use error::BacktestError;
pub use hashing::{
    hash_bytes, hash_file, hash_json, hash_json_bytes, hash_text, hash_text_bytes, hash_text_u64,
    stable_json,
};
pub use quantizer::Quantizer;
pub use types::{Bps, Lots, OrderingKey, QuoteAtoms, Side, Ticks, TsNs, parse_side};
