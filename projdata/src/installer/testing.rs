//! Test fixtures shared by the installer and bridge unit tests.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, StreamExt};

use super::error::{InstallError, InstallResult};
use super::fetch::{ArchiveFetcher, BoxFuture, FetchedArchive};

/// One entry of a fixture archive. `data: None` makes a directory.
pub(crate) struct FixtureEntry {
    pub name: String,
    pub data: Option<Vec<u8>>,
}

impl FixtureEntry {
    pub fn file(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: Some(data.to_vec()),
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: None,
        }
    }
}

/// Build a gzip-compressed ustar archive.
pub(crate) fn tar_gz(entries: &[FixtureEntry]) -> Vec<u8> {
    gzip(&tar_bytes(entries))
}

/// Build an uncompressed ustar archive.
///
/// Names are written into the header verbatim, so unsafe paths survive.
pub(crate) fn tar_bytes(entries: &[FixtureEntry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_ustar();
        let data = entry.data.as_deref().unwrap_or(&[]);
        match entry.data {
            Some(_) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
            }
            None => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
            }
        }
        header.set_size(data.len() as u64);
        let name = entry.name.as_bytes();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Serves one fixed archive from memory, or fails every fetch.
pub(crate) struct MockFetcher {
    archive: Vec<u8>,
    status: Option<u16>,
    chunk_size: usize,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn serving(archive: Vec<u8>) -> Self {
        Self {
            archive,
            status: None,
            chunk_size: 1024,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::serving(Vec::new())
        }
    }

    /// Split the body into chunks of `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArchiveFetcher for MockFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, InstallResult<FetchedArchive>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.status {
            Some(status) => Err(InstallError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            }),
            None => {
                let chunks: Vec<InstallResult<Bytes>> = self
                    .archive
                    .chunks(self.chunk_size)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(FetchedArchive {
                    content_length: Some(self.archive.len() as u64).filter(|&n| n > 0),
                    body: stream::iter(chunks).boxed(),
                })
            }
        };
        Box::pin(async move { result })
    }
}
