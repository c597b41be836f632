//! Chunk-at-a-time target search

use bytes::{Bytes, BytesMut};
use memchr::memmem;

use super::ScanError;

/// Default scan/shard chunk size (4 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// The character being searched for, as its UTF-8 byte sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    ch: char,
    bytes: Vec<u8>,
}

impl Target {
    /// Target for a single character
    pub fn new(ch: char) -> Self {
        let mut buf = [0u8; 4];
        Self {
            ch,
            bytes: ch.encode_utf8(&mut buf).as_bytes().to_vec(),
        }
    }

    /// Parse a user-supplied target. Exactly one character is accepted.
    pub fn parse(input: &str) -> Result<Self, ScanError> {
        let mut chars = input.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Ok(Self::new(ch)),
            _ => Err(ScanError::InvalidTarget(input.to_string())),
        }
    }

    /// The character itself
    pub fn char(&self) -> char {
        self.ch
    }

    /// UTF-8 encoding of the character
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// First byte position of the target within `haystack`
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        match self.bytes.as_slice() {
            [single] => memchr::memchr(*single, haystack),
            needle => memmem::find(haystack, needle),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ch)
    }
}

/// Per-file scan state, fed one chunk at a time
///
/// Chunks are searched independently, so a multi-byte target that straddles a
/// chunk boundary is not detected.
#[derive(Debug, Clone)]
pub struct ChunkScanner {
    target: Target,
    chunk_size: usize,
    chunks_seen: u64,
    bytes_seen: u64,
    matched: Option<u64>,
}

impl ChunkScanner {
    /// Create a scanner for `target` over chunks of `chunk_size` bytes
    pub fn new(target: Target, chunk_size: usize) -> Self {
        Self {
            target,
            chunk_size,
            chunks_seen: 0,
            bytes_seen: 0,
            matched: None,
        }
    }

    /// Feed the next chunk. Returns the absolute offset if the first match
    /// was found in this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<u64> {
        self.chunks_seen += 1;
        self.bytes_seen += chunk.len() as u64;

        if self.matched.is_some() {
            return None;
        }

        let within = self.target.find_in(chunk)?;
        let offset = (self.chunks_seen - 1) * self.chunk_size as u64 + within as u64;
        self.matched = Some(offset);
        Some(offset)
    }

    /// Offset of the first match, once found
    pub fn matched(&self) -> Option<u64> {
        self.matched
    }

    /// Number of chunks fed so far
    pub fn chunks_seen(&self) -> u64 {
        self.chunks_seen
    }

    /// Whether this file can still tie or beat `best`
    ///
    /// An unmatched file that has already consumed more than `best` bytes can
    /// only match beyond `best`.
    pub fn can_still_win(&self, best: Option<u64>) -> bool {
        match (best, self.matched) {
            (None, _) => true,
            (Some(best), Some(offset)) => offset <= best,
            (Some(best), None) => self.bytes_seen <= best,
        }
    }
}

/// Regroups arbitrarily sized network frames into fixed-size chunks
#[derive(Debug)]
pub struct Rechunker {
    chunk_size: usize,
    pending: BytesMut,
}

impl Rechunker {
    /// Create a rechunker emitting `chunk_size`-byte chunks
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            pending: BytesMut::with_capacity(chunk_size),
        }
    }

    /// Append a frame and return every chunk it completes
    pub fn push(&mut self, frame: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(frame);
        let mut ready = Vec::new();
        while self.pending.len() >= self.chunk_size {
            ready.push(self.pending.split_to(self.chunk_size).freeze());
        }
        ready
    }

    /// Flush the trailing partial chunk, if any
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.split().freeze())
        }
    }
}
