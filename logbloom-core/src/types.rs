//! Core types for LogBloom

use crate::{BloomError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::{max, min};
use std::fmt;
use std::str::FromStr;

/// Stream fingerprint (hash of a tenant's label set)
pub type Fingerprint = u64;

/// Timestamp in milliseconds since Unix epoch
pub type Timestamp = i64;

/// Closed, inclusive range `[min, max]` over the fingerprint space
///
/// Ownership ranges, meta ranges, block ranges and gaps all share this type.
/// The derived ordering sorts by `min` and breaks ties by `max`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "RawBounds")]
pub struct FingerprintBounds {
    /// Lowest fingerprint in the range (inclusive)
    pub min: Fingerprint,
    /// Highest fingerprint in the range (inclusive)
    pub max: Fingerprint,
}

/// Relative position of one range against another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsCheck {
    /// Entirely below the other range
    Before,
    /// Entirely above the other range
    After,
    /// Shares at least one fingerprint with the other range
    Overlap,
}

impl FingerprintBounds {
    /// Create a new range. `min` must not exceed `max`.
    pub fn new(min: Fingerprint, max: Fingerprint) -> Self {
        debug_assert!(min <= max, "invalid fingerprint bounds {min}..={max}");
        Self { min, max }
    }

    /// The full 64-bit fingerprint space
    pub fn full() -> Self {
        Self::new(0, Fingerprint::MAX)
    }

    /// Check if two ranges overlap
    pub fn overlaps(&self, other: &FingerprintBounds) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Position of `self` relative to `other`
    pub fn compare(&self, other: &FingerprintBounds) -> BoundsCheck {
        if self.max < other.min {
            BoundsCheck::Before
        } else if self.min > other.max {
            BoundsCheck::After
        } else {
            BoundsCheck::Overlap
        }
    }

    /// Check if `self` lies entirely inside `outer`
    pub fn within(&self, outer: &FingerprintBounds) -> bool {
        self.min >= outer.min && self.max <= outer.max
    }

    /// Check if a fingerprint is within the range
    pub fn contains(&self, fp: Fingerprint) -> bool {
        fp >= self.min && fp <= self.max
    }

    /// Width of the range (`max - min`)
    pub fn range(&self) -> u64 {
        self.max - self.min
    }

    /// The shared part of two ranges, if any
    pub fn intersection(&self, other: &FingerprintBounds) -> Option<FingerprintBounds> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Self::new(max(self.min, other.min), min(self.max, other.max)))
    }

    /// Union of two ranges
    ///
    /// Overlapping or adjacent ranges merge into one; otherwise both are
    /// returned in ascending order.
    pub fn union(&self, other: &FingerprintBounds) -> Vec<FingerprintBounds> {
        if self.overlaps(other) || self.adjacent(other) {
            return vec![Self::new(min(self.min, other.min), max(self.max, other.max))];
        }
        let mut both = vec![*self, *other];
        both.sort();
        both
    }

    /// Remove `other` from `self`, leaving zero, one or two pieces
    pub fn unless(&self, other: &FingerprintBounds) -> Vec<FingerprintBounds> {
        let Some(shared) = self.intersection(other) else {
            return vec![*self];
        };

        let mut pieces = Vec::with_capacity(2);
        if shared.min > self.min {
            pieces.push(Self::new(self.min, shared.min - 1));
        }
        if shared.max < self.max {
            pieces.push(Self::new(shared.max + 1, self.max));
        }
        pieces
    }

    fn adjacent(&self, other: &FingerprintBounds) -> bool {
        self.max.checked_add(1) == Some(other.min) || other.max.checked_add(1) == Some(self.min)
    }
}

/// Unchecked wire form of [`FingerprintBounds`]
#[derive(Deserialize)]
struct RawBounds {
    min: Fingerprint,
    max: Fingerprint,
}

impl TryFrom<RawBounds> for FingerprintBounds {
    type Error = BloomError;

    fn try_from(raw: RawBounds) -> Result<Self> {
        if raw.min > raw.max {
            return Err(BloomError::InvalidFormat(format!(
                "fingerprint bounds {:016x}-{:016x}: min exceeds max",
                raw.min, raw.max
            )));
        }
        Ok(Self::new(raw.min, raw.max))
    }
}

impl fmt::Display for FingerprintBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.min, self.max)
    }
}

impl FromStr for FingerprintBounds {
    type Err = BloomError;

    /// Parse the `Display` form: two hex fingerprints joined by `-`
    fn from_str(s: &str) -> Result<Self> {
        let (lo, hi) = s
            .split_once('-')
            .ok_or_else(|| BloomError::InvalidFormat(format!("fingerprint bounds {s:?}")))?;
        let parse = |part: &str| {
            Fingerprint::from_str_radix(part, 16).map_err(|e| {
                BloomError::InvalidFormat(format!("fingerprint {part:?} in {s:?}: {e}"))
            })
        };
        let (lo, hi) = (parse(lo)?, parse(hi)?);
        if lo > hi {
            return Err(BloomError::InvalidFormat(format!(
                "fingerprint bounds {s:?}: min exceeds max"
            )));
        }
        Ok(Self::new(lo, hi))
    }
}

/// Identifier of one immutable single-tenant index segment (TSDB)
///
/// Segments are keyed by the time they were built and the time window of
/// the data they index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId {
    /// Build time in seconds since Unix epoch
    pub ts: i64,
    /// Earliest indexed sample
    pub from: Timestamp,
    /// Latest indexed sample
    pub through: Timestamp,
    /// Checksum of the segment file
    pub checksum: u32,
}

impl SegmentId {
    /// Create a new segment identifier
    pub fn new(ts: i64, from: Timestamp, through: Timestamp, checksum: u32) -> Self {
        Self {
            ts,
            from,
            through,
            checksum,
        }
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:x}.tsdb",
            self.ts, self.from, self.through, self.checksum
        )
    }
}

/// Reference to one chunk of a series' log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChunkRef {
    /// First entry timestamp
    pub from: Timestamp,
    /// Last entry timestamp
    pub through: Timestamp,
    /// Chunk checksum
    pub checksum: u32,
}

impl ChunkRef {
    /// Create a new chunk reference
    pub fn new(from: Timestamp, through: Timestamp, checksum: u32) -> Self {
        Self {
            from,
            through,
            checksum,
        }
    }
}
