//! Archive fetching.
//!
//! [`ArchiveFetcher`] is the seam between the installer and the network so
//! tests can serve archives from memory. [`HttpFetcher`] is the production
//! implementation over async reqwest.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use super::error::{InstallError, InstallResult};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stream of raw body chunks.
pub type ByteStream = BoxStream<'static, InstallResult<Bytes>>;

/// A successful response ready to be streamed.
pub struct FetchedArchive {
    /// Announced body length. `None` when absent or zero.
    pub content_length: Option<u64>,
    /// Compressed body chunks.
    pub body: ByteStream,
}

/// Source of compressed archives.
pub trait ArchiveFetcher: Send + Sync {
    /// Issue a single GET for `url`.
    ///
    /// Fails with [`InstallError::FetchFailed`] if the request cannot be made
    /// or the response status is not a success.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, InstallResult<FetchedArchive>>;
}

impl<T: ArchiveFetcher + ?Sized> ArchiveFetcher for Arc<T> {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, InstallResult<FetchedArchive>> {
        (**self).fetch(url)
    }
}

/// HTTP archive fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client.
    pub fn new() -> InstallResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InstallError::FetchFailed {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Create a fetcher over an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, InstallResult<FetchedArchive>> {
        Box::pin(async move {
            let response =
                self.client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| InstallError::FetchFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;

            let status = response.status();
            if !status.is_success() || status == reqwest::StatusCode::NO_CONTENT {
                return Err(InstallError::FetchFailed {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status),
                });
            }

            let content_length = response.content_length().filter(|&n| n > 0);

            let body_url = url.to_string();
            let body = response
                .bytes_stream()
                .map_err(move |e| InstallError::FetchFailed {
                    url: body_url.clone(),
                    reason: format!("read error: {}", e),
                })
                .boxed();

            Ok(FetchedArchive {
                content_length,
                body,
            })
        })
    }
}

/// Fail the stream when `idle` passes without a new chunk.
///
/// After the timeout fires the stream ends.
pub fn with_idle_timeout(body: ByteStream, idle: Duration, url: String) -> ByteStream {
    stream::unfold(Some(body), move |state| {
        let url = url.clone();
        async move {
            let mut body = state?;
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(item)) => Some((item, Some(body))),
                Ok(None) => None,
                Err(_) => Some((
                    Err(InstallError::Timeout {
                        url,
                        idle_secs: idle.as_secs(),
                    }),
                    None,
                )),
            }
        }
    })
    .boxed()
}
