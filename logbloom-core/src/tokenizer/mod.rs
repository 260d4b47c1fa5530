//! N-gram tokenization of log lines for bloom filters
//!
//! N-grams are runs of `n` adjacent characters of a line. Inserting every
//! n-gram of every line into a series' bloom filter lets queries test for
//! arbitrary substrings of at least `n` characters.
//!
//! The iterators here reuse one output buffer and hand out a slice borrowed
//! from it, so each token is only readable until the next call to
//! [`TokenIter::next_token`]. Copy a token (`to_vec()`) to keep it; the
//! borrow checker rejects holding it across an advance.
//!
//! A tokenizer owns its buffers and hands them to one iterator at a time,
//! so a single instance cannot be shared between threads while iterating.
//! Use one tokenizer per concurrent lane.

use crate::config::{TokenizerConfig, MAX_CHAR_LEN};
use crate::{BloomError, ChunkRef, Result};

/// A lazy, non-restartable sequence of byte tokens
///
/// The returned slice is overwritten on the next advance.
pub trait TokenIter {
    /// Advance to the next token, or `None` once the input is exhausted
    fn next_token(&mut self) -> Option<&[u8]>;
}

/// Copy every remaining token out of an iterator
pub fn collect_tokens<I: TokenIter>(mut iter: I) -> Vec<Vec<u8>> {
    let mut tokens = Vec::new();
    while let Some(token) = iter.next_token() {
        tokens.push(token.to_vec());
    }
    tokens
}

/// N-gram tokenizer with an optional skip factor
///
/// With `skip = 0` every n-gram is emitted; with `skip = s` only every
/// `(s + 1)`-th starting offset is.
#[derive(Debug, Clone)]
pub struct NGramTokenizer {
    n: usize,
    skip: usize,
    /// Circular buffer holding the last `n + skip` characters
    buffer: Vec<char>,
    /// Output buffer, reused for every token
    res: Vec<u8>,
}

impl NGramTokenizer {
    /// Create a tokenizer emitting `n`-character grams
    pub fn new(n: usize, skip: usize) -> Result<Self> {
        if n == 0 {
            return Err(BloomError::Config("n-gram length must be at least 1".into()));
        }
        Ok(Self {
            n,
            skip,
            buffer: vec!['\0'; n + skip],
            res: Vec::with_capacity(n * MAX_CHAR_LEN),
        })
    }

    /// Create a tokenizer from configuration
    pub fn from_config(config: &TokenizerConfig) -> Result<Self> {
        Self::new(config.ngram_length, config.ngram_skip)
    }

    /// Gram length in characters
    pub fn n(&self) -> usize {
        self.n
    }

    /// Skip factor
    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Iterate over the n-grams of `line`
    pub fn tokens<'a>(&'a mut self, line: &'a str) -> NGramTokenIter<'a> {
        NGramTokenIter {
            n: self.n,
            skip: self.skip,
            seen: 0,
            chars: line.chars(),
            buffer: &mut self.buffer,
            res: &mut self.res,
        }
    }
}

/// Iterator over the n-grams of one line
pub struct NGramTokenIter<'a> {
    n: usize,
    skip: usize,
    /// Characters consumed so far
    seen: usize,
    chars: std::str::Chars<'a>,
    buffer: &'a mut [char],
    res: &'a mut Vec<u8>,
}

impl NGramTokenIter<'_> {
    /// Consume characters until the window lands on an emitting offset
    fn advance(&mut self) -> bool {
        let len = self.buffer.len();
        for c in self.chars.by_ref() {
            self.buffer[self.seen % len] = c;
            self.seen += 1;

            if self.seen < self.n {
                continue;
            }

            // skip + 1: a skip of 0 must still emit every window
            if (self.seen - self.n) % (self.skip + 1) == 0 {
                return true;
            }
        }
        false
    }

    /// Write the current window into the output buffer in line order
    fn reassemble(&mut self) {
        let len = self.buffer.len();
        let start = (self.seen - self.n) % len;
        let mut utf8 = [0u8; MAX_CHAR_LEN];

        self.res.clear();
        for i in 0..self.n {
            let c = self.buffer[(start + i) % len];
            self.res.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
        }
    }
}

impl TokenIter for NGramTokenIter<'_> {
    fn next_token(&mut self) -> Option<&[u8]> {
        if !self.advance() {
            return None;
        }
        self.reassemble();
        Some(self.res.as_slice())
    }
}

/// Wraps a token iterator and prepends a fixed prefix to every token
///
/// The prefix occupies the first `prefix_len` bytes of `buf`; each token is
/// appended after it in place, so no per-token allocation happens once the
/// buffer has grown to fit.
pub struct PrefixedTokenIter<'a, I> {
    buf: &'a mut Vec<u8>,
    prefix_len: usize,
    inner: I,
}

impl<'a, I: TokenIter> PrefixedTokenIter<'a, I> {
    /// Wrap `inner`, using the first `prefix_len` bytes of `buf` as prefix
    pub fn new(buf: &'a mut Vec<u8>, prefix_len: usize, inner: I) -> Self {
        debug_assert!(prefix_len <= buf.len());
        Self {
            buf,
            prefix_len,
            inner,
        }
    }
}

impl<I: TokenIter> TokenIter for PrefixedTokenIter<'_, I> {
    fn next_token(&mut self) -> Option<&[u8]> {
        let token = self.inner.next_token()?;
        self.buf.truncate(self.prefix_len);
        self.buf.extend_from_slice(token);
        Some(self.buf.as_slice())
    }
}

/// Byte length of a chunk prefix
pub const CHUNK_PREFIX_LEN: usize = 8 + 8 + 4;

/// Reset `buf` to the prefix for `chunk` and return the prefix length
///
/// Layout: big-endian `from`, `through`, `checksum`.
pub fn write_chunk_prefix(buf: &mut Vec<u8>, chunk: &ChunkRef) -> usize {
    buf.clear();
    buf.extend_from_slice(&chunk.from.to_be_bytes());
    buf.extend_from_slice(&chunk.through.to_be_bytes());
    buf.extend_from_slice(&chunk.checksum.to_be_bytes());
    CHUNK_PREFIX_LEN
}
