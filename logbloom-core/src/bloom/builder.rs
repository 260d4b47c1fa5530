//! Building bloom blocks from log lines

use super::{BlockLocator, BlockRef, BloomFilter, FORMAT_VERSION};
use crate::config::{BloomConfig, CompactorConfig};
use crate::tokenizer::{write_chunk_prefix, NGramTokenizer, PrefixedTokenIter, TokenIter};
use crate::{BloomError, ChunkRef, Fingerprint, FingerprintBounds, Result, Timestamp};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const MAGIC: &[u8; 4] = b"LBLK";

/// magic + version + bounds + series count
const HEADER_SIZE: usize = 4 + 4 + 8 + 8 + 4;

/// fingerprint + hash count + bit array length
const SERIES_HEADER_SIZE: usize = 8 + 4 + 4;

/// Feeds log lines of a series into its bloom filter
///
/// Every n-gram is inserted twice: bare, and prefixed with the chunk it
/// came from so queries can narrow matches down to chunks.
pub struct SeriesBloomPopulator {
    tokenizer: NGramTokenizer,
    prefix: Vec<u8>,
    bloom: BloomConfig,
}

impl SeriesBloomPopulator {
    /// Create a populator
    pub fn new(tokenizer: NGramTokenizer, bloom: BloomConfig) -> Self {
        Self {
            tokenizer,
            prefix: Vec::new(),
            bloom,
        }
    }

    /// Create a populator from validated configuration
    pub fn from_config(config: &CompactorConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer = NGramTokenizer::from_config(&config.tokenizer)?;
        Ok(Self::new(tokenizer, config.bloom.clone()))
    }

    /// An empty filter sized from configuration
    pub fn new_bloom(&self) -> BloomFilter {
        BloomFilter::new(self.bloom.expected_keys, self.bloom.bits_per_key)
    }

    /// Insert the tokens of one chunk's lines, returning how many were added
    pub fn populate<'l, L>(&mut self, bloom: &mut BloomFilter, chunk: &ChunkRef, lines: L) -> usize
    where
        L: IntoIterator<Item = &'l str>,
    {
        let prefix_len = write_chunk_prefix(&mut self.prefix, chunk);
        let mut inserted = 0;

        for line in lines {
            let mut tokens = self.tokenizer.tokens(line);
            while let Some(token) = tokens.next_token() {
                bloom.add(token);
                inserted += 1;
            }

            let mut prefixed =
                PrefixedTokenIter::new(&mut self.prefix, prefix_len, self.tokenizer.tokens(line));
            while let Some(token) = prefixed.next_token() {
                bloom.add(token);
                inserted += 1;
            }
        }

        inserted
    }
}

/// Accumulates series blooms into one block payload
pub struct BlockBuilder {
    bounds: FingerprintBounds,
    body: BytesMut,
    series: u32,
    last: Option<Fingerprint>,
}

impl BlockBuilder {
    /// Create a builder for a block covering `bounds`
    pub fn new(bounds: FingerprintBounds) -> Self {
        Self {
            bounds,
            body: BytesMut::new(),
            series: 0,
            last: None,
        }
    }

    /// Append a series. Fingerprints must ascend and lie within the block.
    pub fn add_series(&mut self, fp: Fingerprint, bloom: &BloomFilter) -> Result<()> {
        if !self.bounds.contains(fp) {
            return Err(BloomError::InvalidFormat(format!(
                "series {fp:016x} outside block bounds {}",
                self.bounds
            )));
        }
        if let Some(last) = self.last {
            if fp <= last {
                return Err(BloomError::InvalidFormat(format!(
                    "series {fp:016x} added after {last:016x}"
                )));
            }
        }

        let bits = bloom.as_bytes();
        self.body.put_u64_le(fp);
        self.body.put_u32_le(bloom.num_hashes() as u32);
        self.body.put_u32_le(bits.len() as u32);
        self.body.put_slice(bits);

        self.last = Some(fp);
        self.series += 1;
        Ok(())
    }

    /// Number of series added so far
    pub fn len(&self) -> usize {
        self.series as usize
    }

    /// Check if no series were added
    pub fn is_empty(&self) -> bool {
        self.series == 0
    }

    /// Finish the payload and checksum it
    pub fn finish(self) -> BuiltBlock {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.body.len());
        buf.put_slice(MAGIC);
        buf.put_u32_le(FORMAT_VERSION);
        buf.put_u64_le(self.bounds.min);
        buf.put_u64_le(self.bounds.max);
        buf.put_u32_le(self.series);
        buf.put_slice(&self.body);

        let data = buf.freeze();
        let checksum = crc32fast::hash(&data);
        BuiltBlock {
            bounds: self.bounds,
            data,
            checksum,
        }
    }
}

/// A finished block payload
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    /// Fingerprints the block covers
    pub bounds: FingerprintBounds,
    /// Encoded payload
    pub data: Bytes,
    /// CRC32 of `data`
    pub checksum: u32,
}

impl BuiltBlock {
    /// Wrap a fetched payload, verifying its checksum and header
    pub fn from_bytes(data: Bytes, checksum: u32) -> Result<Self> {
        let actual = crc32fast::hash(&data);
        if actual != checksum {
            return Err(BloomError::Checksum {
                expected: checksum,
                actual,
            });
        }

        let (bounds, _) = read_header(&mut &data[..])?;
        Ok(Self {
            bounds,
            data,
            checksum,
        })
    }

    /// Reference to this block once stored under the given time window
    pub fn block_ref(&self, tenant: &str, table: &str, start: Timestamp, end: Timestamp) -> BlockRef {
        BlockRef::new(
            self.bounds,
            BlockLocator {
                tenant: tenant.to_string(),
                table: table.to_string(),
                start,
                end,
                checksum: self.checksum,
            },
        )
    }

    /// Decode every series bloom in fingerprint order
    pub fn series(&self) -> Result<Vec<(Fingerprint, BloomFilter)>> {
        let mut buf = &self.data[..];
        let (_, count) = read_header(&mut buf)?;
        if count as usize > buf.remaining() / SERIES_HEADER_SIZE {
            return Err(BloomError::InvalidFormat(format!(
                "{} series do not fit in {} payload bytes",
                count,
                buf.remaining()
            )));
        }

        let mut series = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if buf.remaining() < SERIES_HEADER_SIZE {
                return Err(BloomError::InvalidFormat("truncated series header".into()));
            }
            let fp = buf.get_u64_le();
            let num_hashes = buf.get_u32_le() as usize;
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                return Err(BloomError::InvalidFormat(format!(
                    "truncated bloom for series {fp:016x}"
                )));
            }
            let bits = buf[..len].to_vec();
            buf.advance(len);
            series.push((fp, BloomFilter::from_bytes(bits, num_hashes)?));
        }

        if buf.has_remaining() {
            return Err(BloomError::InvalidFormat(format!(
                "{} trailing bytes after {} series",
                buf.remaining(),
                count
            )));
        }
        Ok(series)
    }

    /// Decode only the series whose fingerprint falls within `bounds`
    pub fn series_within(
        &self,
        bounds: &FingerprintBounds,
    ) -> Result<Vec<(Fingerprint, BloomFilter)>> {
        Ok(self
            .series()?
            .into_iter()
            .filter(|(fp, _)| bounds.contains(*fp))
            .collect())
    }
}

fn read_header(buf: &mut &[u8]) -> Result<(FingerprintBounds, u32)> {
    if buf.remaining() < HEADER_SIZE {
        return Err(BloomError::InvalidFormat("truncated block header".into()));
    }
    if &buf[..4] != MAGIC {
        return Err(BloomError::InvalidFormat("invalid block magic".into()));
    }
    buf.advance(4);

    let version = buf.get_u32_le();
    if version != FORMAT_VERSION {
        return Err(BloomError::InvalidFormat(format!(
            "unsupported block version: {}",
            version
        )));
    }

    let min = buf.get_u64_le();
    let max = buf.get_u64_le();
    if min > max {
        return Err(BloomError::InvalidFormat(format!(
            "block bounds {min:016x}-{max:016x} are inverted"
        )));
    }
    let count = buf.get_u32_le();
    Ok((FingerprintBounds::new(min, max), count))
}
