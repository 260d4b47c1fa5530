//! Bloom filter over byte-string tokens

use crate::config::MAX_BLOOM_BITS;
use crate::{BloomError, Result};
use xxhash_rust::xxh3::xxh3_64_with_seed;

const SEED_PRIMARY: u64 = 0x6c6f_6762_6c6f_6f6d;
const SEED_SECONDARY: u64 = 0x9e37_79b9_7f4a_7c15;

/// Minimum filter size in bits
const MIN_BITS: usize = 64;

/// Upper bound on hash functions per key
const MAX_HASHES: usize = 30;

/// Bloom filter implementation
///
/// Hashing is seeded xxh3, so filters stay readable across builds and
/// toolchains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: usize,
    num_hashes: usize,
}

impl BloomFilter {
    /// Create a new bloom filter
    ///
    /// The size is clamped to `MAX_BLOOM_BITS`.
    pub fn new(num_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = num_keys
            .saturating_mul(bits_per_key)
            .clamp(MIN_BITS, MAX_BLOOM_BITS);
        let num_bytes = (num_bits + 7) / 8;

        // Optimal number of hash functions
        let num_hashes = ((bits_per_key as f64) * 0.69).round() as usize;
        let num_hashes = num_hashes.clamp(1, MAX_HASHES);

        Self {
            bits: vec![0u8; num_bytes],
            num_bits: num_bytes * 8,
            num_hashes,
        }
    }

    /// Create from existing data
    pub fn from_bytes(data: Vec<u8>, num_hashes: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(BloomError::InvalidFormat("empty bloom filter".into()));
        }
        if num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(BloomError::InvalidFormat(format!(
                "bloom filter with {} hash functions",
                num_hashes
            )));
        }
        if data.len() > MAX_BLOOM_BITS / 8 {
            return Err(BloomError::InvalidFormat(format!(
                "bloom filter of {} bytes",
                data.len()
            )));
        }
        let num_bits = data.len() * 8;
        Ok(Self {
            bits: data,
            num_bits,
            num_hashes,
        })
    }

    /// Add a key to the filter
    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_key(key);

        for i in 0..self.num_hashes {
            let bit = self.bit_position(h1, h2, i);
            self.set_bit(bit);
        }
    }

    /// Check if a key may be in the set
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_key(key);

        (0..self.num_hashes).all(|i| self.get_bit(self.bit_position(h1, h2, i)))
    }

    /// Add a key, returning whether it may already have been present
    pub fn test_and_add(&mut self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_key(key);
        let mut present = true;

        for i in 0..self.num_hashes {
            let bit = self.bit_position(h1, h2, i);
            if !self.get_bit(bit) {
                present = false;
                self.set_bit(bit);
            }
        }
        present
    }

    /// Merge another filter of identical geometry into this one
    pub fn union_with(&mut self, other: &BloomFilter) -> Result<()> {
        if self.num_bits != other.num_bits || self.num_hashes != other.num_hashes {
            return Err(BloomError::InvalidFormat(format!(
                "cannot merge bloom filters of {}x{} and {}x{}",
                self.num_bits, self.num_hashes, other.num_bits, other.num_hashes
            )));
        }
        for (dst, src) in self.bits.iter_mut().zip(&other.bits) {
            *dst |= *src;
        }
        Ok(())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Get number of hash functions
    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    /// Get filter size in bits
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Estimated false positive rate
    pub fn false_positive_rate(&self, num_keys: usize) -> f64 {
        let k = self.num_hashes as f64;
        let m = self.num_bits as f64;
        let n = num_keys as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    fn hash_key(key: &[u8]) -> (u64, u64) {
        (
            xxh3_64_with_seed(key, SEED_PRIMARY),
            xxh3_64_with_seed(key, SEED_SECONDARY) | 1,
        )
    }

    fn bit_position(&self, h1: u64, h2: u64, i: usize) -> usize {
        let hash = h1.wrapping_add((i as u64).wrapping_mul(h2));
        (hash % self.num_bits as u64) as usize
    }

    fn set_bit(&mut self, bit: usize) {
        self.bits[bit / 8] |= 1 << (bit % 8);
    }

    fn get_bit(&self, bit: usize) -> bool {
        (self.bits[bit / 8] >> (bit % 8)) & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_filter_basic() {
        let mut filter = BloomFilter::new(100, 10);

        for i in 0..100 {
            filter.add(format!("key-{}", i).as_bytes());
        }

        // All added keys should be found
        for i in 0..100 {
            assert!(filter.may_contain(format!("key-{}", i).as_bytes()));
        }

        // Count false positives for non-existent keys
        let false_positives = (100..1000)
            .filter(|i| filter.may_contain(format!("key-{}", i).as_bytes()))
            .count();

        // False positive rate should be around 1%
        let fp_rate = false_positives as f64 / 900.0;
        assert!(fp_rate < 0.05, "False positive rate too high: {}", fp_rate);
    }

    #[test]
    fn test_test_and_add() {
        let mut filter = BloomFilter::new(16, 10);
        assert!(!filter.test_and_add(b"abcd"));
        assert!(filter.test_and_add(b"abcd"));
        assert!(filter.may_contain(b"abcd"));
    }

    #[test]
    fn test_bloom_filter_serialization() {
        let mut filter = BloomFilter::new(50, 10);

        for i in 0..50u32 {
            filter.add(&i.to_le_bytes());
        }

        let bytes = filter.as_bytes().to_vec();
        let restored = BloomFilter::from_bytes(bytes, filter.num_hashes()).unwrap();

        assert_eq!(restored, filter);
        for i in 0..50u32 {
            assert!(restored.may_contain(&i.to_le_bytes()));
        }
        assert!(BloomFilter::from_bytes(Vec::new(), 3).is_err());
    }

    #[test]
    fn test_from_bytes_rejects_hash_count_out_of_range() {
        assert!(BloomFilter::from_bytes(vec![0; 8], 0).is_err());
        assert!(matches!(
            BloomFilter::from_bytes(vec![0; 8], 4_000_000_000),
            Err(BloomError::InvalidFormat(_))
        ));
        assert!(BloomFilter::from_bytes(vec![0; 8], MAX_HASHES).is_ok());
    }

    #[test]
    fn test_new_clamps_oversized_filters() {
        let filter = BloomFilter::new(usize::MAX, usize::MAX);
        assert_eq!(filter.num_bits(), MAX_BLOOM_BITS);
        assert_eq!(filter.num_hashes(), MAX_HASHES);

        let filter = BloomFilter::new(0, 10);
        assert_eq!(filter.num_bits(), MIN_BITS);
    }

    #[test]
    fn test_union() {
        let mut left = BloomFilter::new(32, 10);
        let mut right = BloomFilter::new(32, 10);
        left.add(b"left");
        right.add(b"right");

        left.union_with(&right).unwrap();
        assert!(left.may_contain(b"left"));
        assert!(left.may_contain(b"right"));

        let other_size = BloomFilter::new(1000, 10);
        assert!(left.union_with(&other_size).is_err());
    }

    #[test]
    fn test_zero_keys_still_usable() {
        let mut filter = BloomFilter::new(0, 10);
        filter.add(b"x");
        assert!(filter.may_contain(b"x"));
    }
}
