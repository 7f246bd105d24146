//! Incremental reader for the sequential tar container format.
//!
//! An archive is a run of 512-byte headers, each followed by its payload
//! zero-padded to the next 512-byte boundary. An all-zero header block ends
//! the archive.
//!
//! The reader yields one [`ArchiveEntry`] at a time. A file's payload is read
//! through [`ArchiveReader::read_chunk`] in bounded chunks before the next
//! entry is requested; any payload left unread is skipped by the following
//! [`ArchiveReader::next_entry`] call.
//!
//! ```text
//! ┌──────────┬──────────────────────┬─────────┬──────────┬─────
//! │ header   │ payload (size bytes) │ padding │ header   │ ...
//! │ 512 B    │                      │ to 512  │ 512 B    │
//! └──────────┴──────────────────────┴─────────┴──────────┴─────
//! ```

use std::ops::Range;

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, warn};

use super::accumulator::ByteAccumulator;
use super::error::{InstallError, InstallResult};
use super::sanitize::sanitize_path;

/// Size of a header block and the payload alignment unit.
pub const BLOCK_SIZE: usize = 512;

const NAME_FIELD: Range<usize> = 0..100;
const SIZE_FIELD: Range<usize> = 124..136;
const TYPE_FLAG_OFFSET: usize = 156;
const PREFIX_FIELD: Range<usize> = 345..500;

/// Type flag marking a directory entry.
const DIRECTORY_TYPE: u8 = b'5';

/// Number of zero bytes that follow a payload of `size` bytes.
pub fn padding(size: u64) -> u64 {
    let rem = size % BLOCK_SIZE as u64;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE as u64 - rem
    }
}

/// Kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One decoded archive entry with a sanitized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the store root.
    pub path: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Payload size in bytes. Always 0 for directories.
    pub size: u64,
}

/// Raw fields decoded from a header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: String,
    pub prefix: String,
    pub size: u64,
    /// `None` when the type flag byte is NUL.
    pub type_flag: Option<u8>,
}

impl EntryHeader {
    /// Decode a 512-byte header block.
    pub fn decode(block: &[u8]) -> Self {
        let type_flag = match block[TYPE_FLAG_OFFSET] {
            0 => None,
            flag => Some(flag),
        };

        Self {
            name: read_string(&block[NAME_FIELD]),
            prefix: read_string(&block[PREFIX_FIELD]),
            size: parse_size(&block[SIZE_FIELD]),
            type_flag,
        }
    }

    /// Name with the prefix field prepended, if any.
    pub fn full_name(&self) -> String {
        if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.name)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.type_flag == Some(DIRECTORY_TYPE)
    }
}

/// Read a NUL-terminated text field, trimmed.
fn read_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

/// Parse the size field.
///
/// Octal ASCII is the normal form. GNU tar writes sizes too large for 11
/// octal digits in big-endian base-256 with the high bit of the first byte
/// set. Anything unparseable is 0.
fn parse_size(field: &[u8]) -> u64 {
    if field[0] & 0x80 != 0 {
        // Negative base-256 values are never valid sizes.
        if field[0] & 0x40 != 0 {
            return 0;
        }
        return field[1..]
            .iter()
            .try_fold(u64::from(field[0] & 0x7f), |acc, &b| {
                acc.checked_mul(256).map(|v| v | u64::from(b))
            })
            .unwrap_or(0);
    }

    u64::from_str_radix(&read_string(field), 8).unwrap_or(0)
}

/// Bytes a payload of `size` occupies including its padding.
///
/// No archive can hold a region past `u64::MAX`, so an overflowing size is
/// reported as the stream ending before the payload.
fn data_region(size: u64, available: usize) -> InstallResult<u64> {
    size.checked_add(padding(size)).ok_or(InstallError::UnexpectedEnd {
        needed: size,
        available: available as u64,
    })
}

fn is_zero_block(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Streaming archive reader.
pub struct ArchiveReader<S> {
    input: ByteAccumulator<S>,
    /// Unread payload bytes of the current file entry.
    remaining: u64,
    /// Padding still to skip after the current payload.
    pending_padding: u64,
    finished: bool,
    processed: u64,
    skipped: u64,
}

impl<S> ArchiveReader<S>
where
    S: Stream<Item = InstallResult<Bytes>> + Unpin,
{
    pub fn new(input: ByteAccumulator<S>) -> Self {
        Self {
            input,
            remaining: 0,
            pending_padding: 0,
            finished: false,
            processed: 0,
            skipped: 0,
        }
    }

    /// Headers processed so far, skipped entries included.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Entries skipped because their path was unsafe.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Archive bytes consumed so far.
    pub fn consumed(&self) -> u64 {
        self.input.consumed()
    }

    /// Advance to the next entry.
    ///
    /// Returns `None` at the end-of-archive marker, or when the stream ends
    /// cleanly on a block boundary. A stream that stops inside a header is
    /// [`InstallError::UnexpectedEnd`].
    pub async fn next_entry(&mut self) -> InstallResult<Option<ArchiveEntry>> {
        self.skip_current().await?;

        loop {
            if self.finished {
                return Ok(None);
            }

            if !self.input.ensure(BLOCK_SIZE).await? {
                self.finished = true;
                let available = self.input.buffered() as u64;
                if available > 0 {
                    return Err(InstallError::UnexpectedEnd {
                        needed: BLOCK_SIZE as u64,
                        available,
                    });
                }
                debug!("Archive stream ended without end-of-archive marker");
                return Ok(None);
            }

            let block = self.input.take(BLOCK_SIZE).await?;
            if is_zero_block(&block) {
                self.finished = true;
                return Ok(None);
            }

            let header = EntryHeader::decode(&block);
            self.processed += 1;

            let raw_name = header.full_name();
            let data_len = data_region(header.size, self.input.buffered())?;

            let Some(path) = sanitize_path(&raw_name) else {
                warn!(name = %raw_name, "Skipping archive entry with unsafe path");
                self.skipped += 1;
                self.input.discard(data_len).await?;
                continue;
            };

            if header.is_directory() || raw_name.ends_with('/') {
                self.input.discard(data_len).await?;
                return Ok(Some(ArchiveEntry {
                    path,
                    kind: EntryKind::Directory,
                    size: 0,
                }));
            }

            self.remaining = header.size;
            self.pending_padding = padding(header.size);
            return Ok(Some(ArchiveEntry {
                path,
                kind: EntryKind::File,
                size: header.size,
            }));
        }
    }

    /// Read the next payload chunk of the current file entry.
    ///
    /// Chunks are at most one chunk window long. Returns `None` once the
    /// payload is exhausted, after skipping its padding.
    pub async fn read_chunk(&mut self) -> InstallResult<Option<Bytes>> {
        if self.remaining == 0 {
            let pad = std::mem::take(&mut self.pending_padding);
            self.input.discard(pad).await?;
            return Ok(None);
        }

        let step = self.remaining.min(self.input.chunk_size() as u64) as usize;
        let chunk = self.input.take(step).await?;
        self.remaining -= step as u64;
        Ok(Some(chunk))
    }

    async fn skip_current(&mut self) -> InstallResult<()> {
        let remaining = std::mem::take(&mut self.remaining);
        let pad = std::mem::take(&mut self.pending_padding);
        self.input.discard(remaining).await?;
        self.input.discard(pad).await
    }
}
