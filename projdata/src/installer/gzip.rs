//! Single-pass gzip decoding of a chunk stream.
//!
//! Uses flate2's write-side decoder as a push decoder: compressed chunks are
//! written in, decoded bytes are drained out. Each `write` call decodes into
//! the decoder's fixed output buffer, so one drained chunk stays bounded even
//! for highly compressible payloads.

use std::io::Write;

use bytes::{Buf, Bytes};
use flate2::write::GzDecoder;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::error::{InstallError, InstallResult};

struct GunzipState<S> {
    source: S,
    decoder: GzDecoder<Vec<u8>>,
    pending: Bytes,
    saw_input: bool,
    finished: bool,
}

impl<S> GunzipState<S> {
    fn drain(&mut self) -> Option<Bytes> {
        let out = std::mem::take(self.decoder.get_mut());
        (!out.is_empty()).then(|| Bytes::from(out))
    }
}

fn decompression_error(err: std::io::Error) -> InstallError {
    InstallError::DecompressionError(err.to_string())
}

async fn step<S>(mut state: GunzipState<S>) -> InstallResult<Option<(Bytes, GunzipState<S>)>>
where
    S: Stream<Item = InstallResult<Bytes>> + Unpin,
{
    loop {
        if state.finished {
            return Ok(None);
        }

        if !state.pending.is_empty() {
            let n = state
                .decoder
                .write(&state.pending)
                .map_err(decompression_error)?;
            if n == 0 {
                return Err(InstallError::DecompressionError(
                    "trailing data after gzip stream".to_string(),
                ));
            }
            state.pending.advance(n);
            match state.drain() {
                Some(out) => return Ok(Some((out, state))),
                None => continue,
            }
        }

        match state.source.next().await {
            Some(chunk) => {
                state.pending = chunk?;
                state.saw_input |= !state.pending.is_empty();
            }
            None => {
                if !state.saw_input {
                    return Err(InstallError::DecompressionError(
                        "empty gzip stream".to_string(),
                    ));
                }
                state.decoder.try_finish().map_err(decompression_error)?;
                state.finished = true;
                let tail = state.drain();
                return Ok(tail.map(|out| (out, state)));
            }
        }
    }
}

/// Decode a gzip-compressed chunk stream.
///
/// Errors from `source` pass through unchanged. A corrupt or truncated
/// gzip stream yields [`InstallError::DecompressionError`].
pub fn gunzip<S>(source: S) -> BoxStream<'static, InstallResult<Bytes>>
where
    S: Stream<Item = InstallResult<Bytes>> + Send + Unpin + 'static,
{
    let state = GunzipState {
        source,
        decoder: GzDecoder::new(Vec::new()),
        pending: Bytes::new(),
        saw_input: false,
        finished: false,
    };

    stream::try_unfold(state, step).boxed()
}
