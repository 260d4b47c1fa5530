//! Configuration for tokenization, bloom building and planning

use crate::{BloomError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default n-gram length in characters
pub const DEFAULT_NGRAM_LENGTH: usize = 4;

/// Default n-gram skip factor
pub const DEFAULT_NGRAM_SKIP: usize = 0;

/// Maximum UTF-8 bytes per character
pub const MAX_CHAR_LEN: usize = 4;

/// Default bloom filter bits per key (~1% false positives)
pub const BLOOM_BITS_PER_KEY: usize = 10;

/// Default number of keys a series bloom is sized for
pub const BLOOM_EXPECTED_KEYS: usize = 4096;

/// Largest bloom filter, in bits, that will be allocated or decoded
pub const MAX_BLOOM_BITS: usize = 1 << 28;

/// N-gram tokenizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Gram length in characters
    pub ngram_length: usize,
    /// Starting offsets skipped between emitted grams
    pub ngram_skip: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            ngram_length: DEFAULT_NGRAM_LENGTH,
            ngram_skip: DEFAULT_NGRAM_SKIP,
        }
    }
}

/// Bloom filter sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Bits per expected key
    pub bits_per_key: usize,
    /// Keys each series filter is sized for
    pub expected_keys: usize,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            bits_per_key: BLOOM_BITS_PER_KEY,
            expected_keys: BLOOM_EXPECTED_KEYS,
        }
    }
}

/// What to do with a segment that no meta references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Fail the run with `MissingCoverage`
    #[default]
    Reject,
    /// Treat the whole ownership range as a gap for that segment
    WholeRange,
}

/// Planner configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Handling of segments without any referencing meta
    pub coverage_policy: CoveragePolicy,
}

/// Top-level compactor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    pub tokenizer: TokenizerConfig,
    pub bloom: BloomConfig,
    pub planner: PlannerConfig,
}

impl CompactorConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the tokenizer or bloom filter cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.tokenizer.ngram_length == 0 {
            return Err(BloomError::Config("tokenizer.ngram_length must be at least 1".into()));
        }
        if self.bloom.bits_per_key == 0 {
            return Err(BloomError::Config("bloom.bits_per_key must be at least 1".into()));
        }
        if self.bloom.expected_keys == 0 {
            return Err(BloomError::Config("bloom.expected_keys must be at least 1".into()));
        }
        match self.bloom.expected_keys.checked_mul(self.bloom.bits_per_key) {
            Some(bits) if bits <= MAX_BLOOM_BITS => {}
            _ => {
                return Err(BloomError::Config(format!(
                    "bloom.expected_keys * bloom.bits_per_key must not exceed {} bits",
                    MAX_BLOOM_BITS
                )))
            }
        }
        Ok(())
    }
}
