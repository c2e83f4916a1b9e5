//! Staged record encodings.
//!
//! # Overview
//!
//! Every stage of the pipeline reads and writes newline-terminated text
//! records. Numeric fields are fixed width (zero-padded decimal sizes,
//! zero-padded hex inode and device numbers, 32-character MD5 digests) so a
//! plain byte-wise sort of whole lines orders records numerically. Paths are
//! variable length and end at [`SENTINEL`]. A size record, a hash record and
//! a cluster record:
//!
//! ```text
//! 00000000000000001024 00000000000a1b2c 0000000000000803 /data/a.txt!*END*! f
//! d41d8cd98f00b204e9800998ecf8427e 00000000000a1b2c 0000000000000803 /data/a.txt!*END*! f
//! /data/a.txt!*END*! <hash record>
//! ```
//!
//! Paths are written as raw bytes, so non-UTF-8 names pass through intact.
//! A path containing the sentinel or a newline cannot be represented and is
//! rejected by [`is_encodable`].

use std::io::{self, BufRead, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::scanner::device::FileId;
use crate::scanner::hasher::{hash_to_hex, hex_to_hash, Hash};

/// Marks the end of a path field.
pub const SENTINEL: &[u8] = b"!*END*!";

/// Width of the zero-padded decimal size field.
pub const SIZE_WIDTH: usize = 20;

/// Width of the zero-padded hex inode and device fields.
pub const ID_WIDTH: usize = 16;

/// Width of the hex-encoded MD5 digest.
pub const HASH_WIDTH: usize = 32;

/// Errors raised while decoding a staged record.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    /// The line is shorter than its fixed-width prefix.
    #[error("Record too short ({len} bytes): {line}")]
    Truncated {
        /// Length of the offending line
        len: usize,
        /// Lossy rendering of the line
        line: String,
    },

    /// A fixed-width field holds an invalid value.
    #[error("Invalid {field} field in record: {line}")]
    InvalidField {
        /// Name of the field
        field: &'static str,
        /// Lossy rendering of the line
        line: String,
    },

    /// The path is not followed by the sentinel and a type code.
    #[error("Missing path terminator in record: {0}")]
    MissingSentinel(String),

    /// The type code is neither `f` nor `s`.
    #[error("Unknown file type '{kind}' in record: {line}")]
    UnknownKind {
        /// The type byte found
        kind: char,
        /// Lossy rendering of the line
        line: String,
    },

    /// An I/O error occurred while reading or writing records.
    #[error("I/O error on staged records: {0}")]
    Io(#[from] io::Error),
}

impl RecordError {
    fn invalid(field: &'static str, line: &[u8]) -> Self {
        Self::InvalidField {
            field,
            line: lossy(line),
        }
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// What kind of entry a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    /// A regular file (`f`)
    Regular,
    /// A symlink whose target is a regular file (`s`)
    Symlink,
}

impl FileKind {
    /// The one-byte type code used in records.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Regular => b'f',
            Self::Symlink => b's',
        }
    }

    /// Parse a type code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'f' => Some(Self::Regular),
            b's' => Some(Self::Symlink),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code() as char)
    }
}

/// A line-oriented record that can be staged on disk.
pub trait Record: Sized {
    /// Append the encoded record, including its trailing newline.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode a record from a line without its trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the line is malformed.
    fn decode(line: &[u8]) -> Result<Self, RecordError>;

    /// Encode into a fresh buffer.
    fn to_line(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        self.encode(&mut out);
        out
    }
}

/// Candidate file keyed by size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeRecord {
    /// File size in bytes
    pub size: u64,
    /// Identity of the file (target identity for symlinks)
    pub id: FileId,
    /// Path as found during traversal
    pub path: PathBuf,
    /// Regular file or symlink
    pub kind: FileKind,
}

/// Candidate file keyed by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    /// MD5 digest of the file content
    pub hash: Hash,
    /// Identity of the file
    pub id: FileId,
    /// Path as found during traversal
    pub path: PathBuf,
    /// Regular file or symlink
    pub kind: FileKind,
}

/// A hash record labelled with the first path of its cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRecord {
    /// Representative path of the cluster
    pub label: PathBuf,
    /// The labelled record
    pub record: HashRecord,
}

impl HashRecord {
    /// Attach a content hash to a size record.
    #[must_use]
    pub fn from_size_record(record: &SizeRecord, hash: Hash) -> Self {
        Self {
            hash,
            id: record.id,
            path: record.path.clone(),
            kind: record.kind,
        }
    }
}

impl Record for SizeRecord {
    fn encode(&self, out: &mut Vec<u8>) {
        // Formatting into a Vec<u8> cannot fail.
        let _ = write!(
            out,
            "{:0sw$} {:0iw$x} {:0iw$x} ",
            self.size,
            self.id.inode,
            self.id.device,
            sw = SIZE_WIDTH,
            iw = ID_WIDTH
        );
        encode_tail(&self.path, self.kind, out);
    }

    fn decode(line: &[u8]) -> Result<Self, RecordError> {
        let prefix = SIZE_WIDTH + 1 + ID_WIDTH + 1 + ID_WIDTH + 1;
        if line.len() < prefix {
            return Err(RecordError::Truncated {
                len: line.len(),
                line: lossy(line),
            });
        }
        let size = parse_decimal(&line[..SIZE_WIDTH])
            .ok_or_else(|| RecordError::invalid("size", line))?;
        expect_space(line, SIZE_WIDTH)?;
        let id = decode_id(line, SIZE_WIDTH + 1)?;
        let (path, kind) = decode_tail(&line[prefix..], line)?;
        Ok(Self {
            size,
            id,
            path,
            kind,
        })
    }
}

impl Record for HashRecord {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(hash_to_hex(&self.hash).as_bytes());
        let _ = write!(
            out,
            " {:0iw$x} {:0iw$x} ",
            self.id.inode,
            self.id.device,
            iw = ID_WIDTH
        );
        encode_tail(&self.path, self.kind, out);
    }

    fn decode(line: &[u8]) -> Result<Self, RecordError> {
        let prefix = HASH_WIDTH + 1 + ID_WIDTH + 1 + ID_WIDTH + 1;
        if line.len() < prefix {
            return Err(RecordError::Truncated {
                len: line.len(),
                line: lossy(line),
            });
        }
        let hash = hex_to_hash(&line[..HASH_WIDTH])
            .ok_or_else(|| RecordError::invalid("hash", line))?;
        expect_space(line, HASH_WIDTH)?;
        let id = decode_id(line, HASH_WIDTH + 1)?;
        let (path, kind) = decode_tail(&line[prefix..], line)?;
        Ok(Self {
            hash,
            id,
            path,
            kind,
        })
    }
}

impl Record for ClusterRecord {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&path_to_bytes(&self.label));
        out.extend_from_slice(SENTINEL);
        out.push(b' ');
        self.record.encode(out);
    }

    fn decode(line: &[u8]) -> Result<Self, RecordError> {
        let end = find(line, SENTINEL).ok_or_else(|| RecordError::MissingSentinel(lossy(line)))?;
        let rest = &line[end + SENTINEL.len()..];
        if rest.first() != Some(&b' ') {
            return Err(RecordError::MissingSentinel(lossy(line)));
        }
        Ok(Self {
            label: bytes_to_path(&line[..end]),
            record: HashRecord::decode(&rest[1..])?,
        })
    }
}

fn encode_tail(path: &Path, kind: FileKind, out: &mut Vec<u8>) {
    out.extend_from_slice(&path_to_bytes(path));
    out.extend_from_slice(SENTINEL);
    out.push(b' ');
    out.push(kind.code());
    out.push(b'\n');
}

/// Split `path!*END*! t` into its path and kind.
fn decode_tail(tail: &[u8], line: &[u8]) -> Result<(PathBuf, FileKind), RecordError> {
    let n = tail.len();
    if n < SENTINEL.len() + 3 || tail[n - 2] != b' ' || !tail[..n - 2].ends_with(SENTINEL) {
        return Err(RecordError::MissingSentinel(lossy(line)));
    }
    let code = tail[n - 1];
    let kind = FileKind::from_code(code).ok_or_else(|| RecordError::UnknownKind {
        kind: code as char,
        line: lossy(line),
    })?;
    let path = &tail[..n - 2 - SENTINEL.len()];
    if path.is_empty() {
        return Err(RecordError::invalid("path", line));
    }
    Ok((bytes_to_path(path), kind))
}

fn decode_id(line: &[u8], start: usize) -> Result<FileId, RecordError> {
    let inode = parse_hex(&line[start..start + ID_WIDTH])
        .ok_or_else(|| RecordError::invalid("inode", line))?;
    expect_space(line, start + ID_WIDTH)?;
    let dev_start = start + ID_WIDTH + 1;
    let device = parse_hex(&line[dev_start..dev_start + ID_WIDTH])
        .ok_or_else(|| RecordError::invalid("device", line))?;
    expect_space(line, dev_start + ID_WIDTH)?;
    Ok(FileId::new(device, inode))
}

fn expect_space(line: &[u8], at: usize) -> Result<(), RecordError> {
    if line.get(at) == Some(&b' ') {
        Ok(())
    } else {
        Err(RecordError::invalid("separator", line))
    }
}

fn parse_decimal(field: &[u8]) -> Option<u64> {
    if !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}

fn parse_hex(field: &[u8]) -> Option<u64> {
    if !field.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u64::from_str_radix(std::str::from_utf8(field).ok()?, 16).ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Whether a path can be written into a record.
#[must_use]
pub fn is_encodable(path: &Path) -> bool {
    let bytes = path_to_bytes(path);
    !bytes.is_empty() && !bytes.contains(&b'\n') && find(&bytes, SENTINEL).is_none()
}

/// Raw bytes of a path.
#[cfg(unix)]
#[must_use]
pub fn path_to_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
}

/// Raw bytes of a path.
#[cfg(not(unix))]
#[must_use]
pub fn path_to_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    match path.to_string_lossy() {
        std::borrow::Cow::Borrowed(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
        std::borrow::Cow::Owned(s) => std::borrow::Cow::Owned(s.into_bytes()),
    }
}

/// Rebuild a path from raw bytes.
#[cfg(unix)]
#[must_use]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

/// Rebuild a path from raw bytes.
#[cfg(not(unix))]
#[must_use]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Streams decoded records from a buffered reader.
pub struct RecordReader<R, T> {
    reader: R,
    line: Vec<u8>,
    _record: PhantomData<T>,
}

impl<R: BufRead, T: Record> RecordReader<R, T> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
            _record: PhantomData,
        }
    }
}

impl<R: BufRead, T: Record> Iterator for RecordReader<R, T> {
    type Item = Result<T, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line.clear();
        match self.reader.read_until(b'\n', &mut self.line) {
            Ok(0) => None,
            Ok(_) => {
                if self.line.last() == Some(&b'\n') {
                    self.line.pop();
                }
                Some(T::decode(&self.line))
            }
            Err(e) => Some(Err(RecordError::Io(e))),
        }
    }
}

/// Writes encoded records to an output stream.
pub struct RecordWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a writer. Callers should pass a buffered writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::with_capacity(256),
            written: 0,
        }
    }

    /// Encode and write one record.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn write<T: Record>(&mut self, record: &T) -> io::Result<()> {
        self.buffer.clear();
        record.encode(&mut self.buffer);
        self.writer.write_all(&self.buffer)?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the inner writer.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
