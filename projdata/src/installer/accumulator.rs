//! Append/consume buffer over an asynchronous byte source.
//!
//! The archive reader asks for exact-length slices; the accumulator pulls
//! from its source only when the buffered bytes cannot satisfy a request.
//! Consumed bytes are split off the front of the buffer without copying the
//! remainder.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use super::error::{InstallError, InstallResult};

/// Default chunk window for payload reads and discards (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Buffered reader over a stream of byte chunks.
pub struct ByteAccumulator<S> {
    source: S,
    buffer: BytesMut,
    exhausted: bool,
    /// Bytes pulled from the source so far.
    pulled: u64,
    /// Bytes handed out through `take`/`discard` so far.
    consumed: u64,
    chunk_size: usize,
}

impl<S> ByteAccumulator<S>
where
    S: Stream<Item = InstallResult<Bytes>> + Unpin,
{
    /// Create an accumulator with the default chunk window.
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    /// Create an accumulator with a custom chunk window.
    pub fn with_chunk_size(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            buffer: BytesMut::new(),
            exhausted: false,
            pulled: 0,
            consumed: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk window used by `discard` and payload reads.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes pulled from the source.
    pub fn pulled(&self) -> u64 {
        self.pulled
    }

    /// Total bytes consumed by the reader.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Whether the source has reported its end.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    async fn pull(&mut self) -> InstallResult<()> {
        match self.source.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                self.pulled += chunk.len() as u64;
                self.buffer.extend_from_slice(&chunk);
            }
            None => self.exhausted = true,
        }
        Ok(())
    }

    /// Pull from the source until `n` bytes are buffered or it is exhausted.
    ///
    /// Returns whether `n` bytes are now available.
    pub async fn ensure(&mut self, n: usize) -> InstallResult<bool> {
        while self.buffer.len() < n && !self.exhausted {
            self.pull().await?;
        }
        Ok(self.buffer.len() >= n)
    }

    /// Take exactly `n` bytes.
    ///
    /// Fails with [`InstallError::UnexpectedEnd`] if the source ends first.
    pub async fn take(&mut self, n: usize) -> InstallResult<Bytes> {
        if !self.ensure(n).await? {
            return Err(InstallError::UnexpectedEnd {
                needed: n as u64,
                available: self.buffer.len() as u64,
            });
        }
        self.consumed += n as u64;
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Skip `n` bytes, at most one chunk window at a time.
    pub async fn discard(&mut self, mut n: u64) -> InstallResult<()> {
        while n > 0 {
            let step = n.min(self.chunk_size as u64) as usize;
            self.take(step).await?;
            n -= step as u64;
        }
        Ok(())
    }
}
