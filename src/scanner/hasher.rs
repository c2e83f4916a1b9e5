//! MD5 content hashing and bounded prefix comparison.
//!
//! # Overview
//!
//! The report format carries MD5 digests, so content identity is computed
//! with MD5 over the whole byte stream of a file. Files are streamed through
//! a fixed-size buffer and never mapped or loaded whole.
//!
//! Before paying for a full hash, the screener can compare the first
//! [`COMPARE_SIZE`] bytes of two same-size files with [`Hasher::compare_prefix`],
//! or digest that many bytes of each member of a larger group with
//! [`Hasher::prefix_hash`].
//!
//! # Example
//!
//! ```no_run
//! use dupsort::scanner::{hash_to_hex, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let hash = hasher.full_hash(Path::new("Cargo.toml")).unwrap();
//! println!("{}", hash_to_hex(&hash));
//! ```

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// A 16-byte MD5 digest.
pub type Hash = [u8; 16];

/// Number of bytes read from each file by the bounded compare (128 KiB).
pub const COMPARE_SIZE: usize = 128 * 1024;

/// Read buffer used while hashing (1 MiB).
const BUFFER_SIZE: usize = 1024 * 1024;

/// Result of comparing the leading bytes of two files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixComparison {
    /// Both reads returned the same bytes.
    Equal,
    /// The reads returned the same number of bytes but the bytes differ.
    Different,
    /// The reads returned different byte counts; one of the files changed
    /// size since it was scanned.
    LengthMismatch {
        /// Bytes read from the first file
        first: usize,
        /// Bytes read from the second file
        second: usize,
    },
}

/// Streaming MD5 hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    buffer_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default 1 MiB read buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: BUFFER_SIZE,
            shutdown_flag: None,
        }
    }

    /// Use a different read buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096);
        self
    }

    /// Abort long reads when the flag is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the MD5 digest of the entire file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read, or
    /// [`HashError::Interrupted`] if shutdown was requested mid-file.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        let mut file = open(path)?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted);
            }
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            context.consume(&buffer[..read]);
        }

        Ok(context.compute().0)
    }

    /// Read at most `limit` bytes from the start of the file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn read_prefix(&self, path: &Path, limit: usize) -> Result<Vec<u8>, HashError> {
        let file = open(path)?;
        let mut prefix = Vec::with_capacity(limit.min(COMPARE_SIZE));
        file.take(limit as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| HashError::from_io(path, e))?;
        Ok(prefix)
    }

    /// MD5 digest of at most `limit` bytes from the start of the file.
    ///
    /// Returns the digest and the number of bytes actually read. When the
    /// whole file fits in `limit` the digest equals [`full_hash`](Self::full_hash).
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn prefix_hash(&self, path: &Path, limit: usize) -> Result<(Hash, usize), HashError> {
        let prefix = self.read_prefix(path, limit)?;
        Ok((md5::compute(&prefix).0, prefix.len()))
    }

    /// Compare the first `min(size, limit)` bytes of two files.
    ///
    /// `size` is the size both files had when they were scanned.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if either file cannot be read.
    pub fn compare_prefix(
        &self,
        first: &Path,
        second: &Path,
        size: u64,
        limit: usize,
    ) -> Result<PrefixComparison, HashError> {
        let wanted = usize::try_from(size).map_or(limit, |s| s.min(limit));
        let a = self.read_prefix(first, wanted)?;
        let b = self.read_prefix(second, wanted)?;

        if a.len() != b.len() || a.len() != wanted {
            if a.len() == b.len() {
                // Both shrank identically; the bytes still decide.
                return Ok(if a == b {
                    PrefixComparison::Equal
                } else {
                    PrefixComparison::Different
                });
            }
            return Ok(PrefixComparison::LengthMismatch {
                first: a.len(),
                second: b.len(),
            });
        }

        Ok(if a == b {
            PrefixComparison::Equal
        } else {
            PrefixComparison::Different
        })
    }
}

fn open(path: &Path) -> Result<File, HashError> {
    File::open(path).map_err(|e| HashError::from_io(path, e))
}

/// Encode a digest as 32 lowercase hex characters.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    let mut out = String::with_capacity(32);
    for byte in hash {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Decode 32 hex characters into a digest.
///
/// Returns `None` if the input is not exactly 32 hex digits.
#[must_use]
pub fn hex_to_hash(hex: &[u8]) -> Option<Hash> {
    if hex.len() != 32 {
        return None;
    }
    let mut hash = [0u8; 16];
    for (i, pair) in hex.chunks_exact(2).enumerate() {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        hash[i] = (hi << 4) | lo;
    }
    Some(hash)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
