//! Bloom blocks and the metadata describing them
//!
//! A block holds one bloom filter per series for a contiguous fingerprint
//! range. A [`Meta`] records which source segments a set of blocks was built
//! from. Both are immutable once written; planning only reads them.

mod builder;
mod filter;

pub use builder::{BlockBuilder, BuiltBlock, SeriesBloomPopulator};
pub use filter::BloomFilter;

use crate::{FingerprintBounds, SegmentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block payload format version
pub const FORMAT_VERSION: u32 = 1;

/// Where a block's bytes live in storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocator {
    /// Owning tenant
    pub tenant: String,
    /// Index table (day bucket) the block belongs to
    pub table: String,
    /// Earliest log timestamp covered
    pub start: Timestamp,
    /// Latest log timestamp covered
    pub end: Timestamp,
    /// CRC32 of the block payload
    pub checksum: u32,
}

impl fmt::Display for BlockLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}-{}-{:x}",
            self.table, self.tenant, self.start, self.end, self.checksum
        )
    }
}

/// Reference to one stored bloom block
///
/// Two references naming the same range and locator are the same block,
/// however they were discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    /// Fingerprints the block covers
    pub bounds: FingerprintBounds,
    /// Location of the block payload
    pub locator: BlockLocator,
}

impl BlockRef {
    /// Create a new block reference
    pub fn new(bounds: FingerprintBounds, locator: BlockLocator) -> Self {
        Self { bounds, locator }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.bounds, self.locator)
    }
}

/// Record of one previously built artifact
///
/// The listed blocks were built from `sources` and together cover `bounds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Fingerprint range the meta covers
    pub bounds: FingerprintBounds,
    /// Segments the blocks were built from
    pub sources: Vec<SegmentId>,
    /// Blocks produced for this range
    #[serde(default)]
    pub blocks: Vec<BlockRef>,
}

impl Meta {
    /// Create a new meta
    pub fn new(bounds: FingerprintBounds, sources: Vec<SegmentId>, blocks: Vec<BlockRef>) -> Self {
        Self {
            bounds,
            sources,
            blocks,
        }
    }

    /// Check if the meta was built (at least partly) from `segment`
    pub fn built_from(&self, segment: &SegmentId) -> bool {
        self.sources.contains(segment)
    }
}
