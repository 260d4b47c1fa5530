//! LogBloom Core - Bloom Block Planning for Sharded Log Stores
//!
//! Log streams are identified by a 64-bit fingerprint. A worker owns a
//! contiguous fingerprint range and builds bloom-filter blocks for it from
//! immutable, time-partitioned index segments (TSDBs). This crate decides
//! what still has to be built and which existing blocks can be reused.
//!
//! # Architecture
//!
//! - **Types**: [`FingerprintBounds`], the one interval type everything is built on
//! - **Tokenizer**: n-gram tokenization of log lines for bloom insertion
//! - **Bloom**: bloom filters, block references, metas and block building
//! - **Planner**: gap finding, per-segment gap aggregation and block plans
//! - **Compaction**: drives a planning run against metadata and block storage

pub mod bloom;
pub mod compaction;
pub mod config;
pub mod planner;
pub mod tokenizer;

mod error;
mod types;

pub use error::{BloomError, Result};
pub use types::*;

/// LogBloom version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
