//! Integration tests for bundle installation.
//!
//! These tests drive the public API end to end:
//! - HTTP fetch → gunzip → tar parsing → directory store
//! - Version caching and wipe-on-upgrade
//! - Unsafe entries, failed fetches, truncated archives
//! - The worker bridge and bundle handles
//!
//! Run with: `cargo test --test install_integration`

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::stream::{self, StreamExt};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use projdata::bridge::InstallerClient;
use projdata::installer::{
    ArchiveFetcher, BoxFuture, BundleInstaller, DirectoryStore, EntryKind, ErrorKind,
    FetchedArchive, HttpFetcher, InstallError, InstallRequest, InstallResult, InstallStatus,
    InstallerConfig, ProgressReport, VersionLedger, VERSION_MARKER,
};
use projdata::{ensure_bundle, EngineCapabilities, MountPlan};

// ============================================================================
// Helper Functions
// ============================================================================

/// One archive entry; `data: None` is a directory.
struct Entry {
    name: String,
    data: Option<Vec<u8>>,
}

fn file(name: &str, data: &[u8]) -> Entry {
    Entry {
        name: name.to_string(),
        data: Some(data.to_vec()),
    }
}

fn dir(name: &str) -> Entry {
    Entry {
        name: name.to_string(),
        data: None,
    }
}

/// Build a `.tar.gz`. Names go into the header verbatim.
fn tar_gz(entries: &[Entry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_ustar();
        let payload = entry.data.as_deref().unwrap_or(&[]);
        match entry.data {
            Some(_) => header.set_entry_type(tar::EntryType::Regular),
            None => header.set_entry_type(tar::EntryType::Directory),
        }
        header.set_mode(0o644);
        header.set_size(payload.len() as u64);
        header.as_old_mut().name[..entry.name.len()].copy_from_slice(entry.name.as_bytes());
        header.set_cksum();
        builder.append(&header, payload).unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&builder.into_inner().unwrap()).unwrap();
    encoder.finish().unwrap()
}

/// In-memory fetcher keyed by URL. Unknown URLs fail like a 404.
#[derive(Default)]
struct MemoryFetcher {
    archives: Mutex<BTreeMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    fn with(self, url: &str, archive: Vec<u8>) -> Self {
        self.archives.lock().unwrap().insert(url.to_string(), archive);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArchiveFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, InstallResult<FetchedArchive>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let archive = self.archives.lock().unwrap().get(url).cloned();
        Box::pin(async move {
            let archive = archive.ok_or_else(|| InstallError::FetchFailed {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })?;
            let chunks: Vec<InstallResult<Bytes>> = archive
                .chunks(700)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(FetchedArchive {
                content_length: Some(archive.len() as u64),
                body: stream::iter(chunks).boxed(),
            })
        })
    }
}

/// Serve `body` with `status` to every connection on a local port.
async fn serve(status: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}/proj-data.tar.gz", addr)
}

fn http_installer(temp: &TempDir) -> BundleInstaller<HttpFetcher> {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    BundleInstaller::new(
        HttpFetcher::with_client(client),
        InstallerConfig::new(temp.path().to_path_buf()),
    )
}

fn memory_installer(
    temp: &TempDir,
    fetcher: Arc<MemoryFetcher>,
) -> BundleInstaller<Arc<MemoryFetcher>> {
    BundleInstaller::new(
        fetcher,
        InstallerConfig::new(temp.path().to_path_buf()).with_chunk_size(1000),
    )
}

/// Relative file paths and contents under `root`, marker excluded.
fn files_under(root: &Path) -> BTreeMap<String, Vec<u8>> {
    DirectoryStore::at(root)
        .list()
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| {
            let data = std::fs::read(root.join(&e.path)).unwrap();
            (e.path, data)
        })
        .collect()
}

// ============================================================================
// HTTP end to end
// ============================================================================

#[tokio::test]
async fn test_http_install_file_and_directory() {
    let temp = TempDir::new().unwrap();
    let url = serve(
        "200 OK",
        tar_gz(&[file("a/b.txt", b"abcd"), dir("c/")]),
    )
    .await;
    let installer = http_installer(&temp);

    let outcome = installer
        .install(&InstallRequest::new(&url, "2025-02-01"), None)
        .await
        .unwrap();

    let root = temp.path().join("proj-data");
    assert_eq!(outcome.status, InstallStatus::Installed);
    assert_eq!(outcome.entries_written, 2);
    assert_eq!(std::fs::read(root.join("a/b.txt")).unwrap(), b"abcd");
    assert!(root.join("c").is_dir());
    assert_eq!(std::fs::read_dir(root.join("c")).unwrap().count(), 0);

    let store = DirectoryStore::at(&root);
    assert_eq!(
        VersionLedger::new(&store).read().await.as_deref(),
        Some("2025-02-01")
    );
}

#[tokio::test]
async fn test_http_404_is_fetch_failed_and_store_untrusted() {
    let temp = TempDir::new().unwrap();
    let url = serve("404 Not Found", Vec::new()).await;
    let installer = http_installer(&temp);

    let err = installer
        .install(&InstallRequest::new(&url, "1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::FetchFailed { .. }));

    let store = installer.open_store(None).await.unwrap();
    let ledger = VersionLedger::new(&store);
    assert_eq!(ledger.read().await, None);
    assert!(!ledger.is_current("1").await);
}

#[tokio::test]
async fn test_http_truncated_archive_fails_without_marker() {
    let temp = TempDir::new().unwrap();
    let mut archive = tar_gz(&[file("big.bin", &[5u8; 20_000])]);
    archive.truncate(archive.len() / 2);
    let url = serve("200 OK", archive).await;
    let installer = http_installer(&temp);

    let err = installer
        .install(&InstallRequest::new(&url, "1"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::DecompressionError | ErrorKind::UnexpectedEnd
    ));

    let store = installer.open_store(None).await.unwrap();
    assert_eq!(VersionLedger::new(&store).read().await, None);
}

// ============================================================================
// Caching and upgrades
// ============================================================================

#[tokio::test]
async fn test_second_install_is_cached_without_fetch() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MemoryFetcher::default().with("http://x/v1.tar.gz", tar_gz(&[file("grid", b"1")])),
    );
    let installer = memory_installer(&temp, Arc::clone(&fetcher));
    let request = InstallRequest::new("http://x/v1.tar.gz", "v1");

    installer.install(&request, None).await.unwrap();
    let root = temp.path().join("proj-data");
    let before = files_under(&root);

    let outcome = installer
        .install(&InstallRequest::new("http://x/v1.tar.gz", " v1 "), None)
        .await
        .unwrap();

    assert_eq!(outcome.status, InstallStatus::Cached);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(files_under(&root), before);
}

#[tokio::test]
async fn test_upgrade_wipes_previous_version() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with(
                "http://x/v1.tar.gz",
                tar_gz(&[file("old/only.txt", b"v1"), file("shared.txt", b"one")]),
            )
            .with(
                "http://x/v2.tar.gz",
                tar_gz(&[file("shared.txt", b"two"), file("new.txt", b"v2")]),
            ),
    );
    let installer = memory_installer(&temp, fetcher);

    installer
        .install(&InstallRequest::new("http://x/v1.tar.gz", "1"), None)
        .await
        .unwrap();
    installer
        .install(&InstallRequest::new("http://x/v2.tar.gz", "2"), None)
        .await
        .unwrap();

    let root = temp.path().join("proj-data");
    let files = files_under(&root);
    let expected: BTreeMap<String, Vec<u8>> = [
        ("new.txt".to_string(), b"v2".to_vec()),
        ("shared.txt".to_string(), b"two".to_vec()),
    ]
    .into_iter()
    .collect();
    assert_eq!(files, expected);
    assert!(!root.join("old").exists());
}

// ============================================================================
// Archive content
// ============================================================================

#[tokio::test]
async fn test_unsafe_entries_are_skipped() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(MemoryFetcher::default().with(
        "http://x/a.tar.gz",
        tar_gz(&[
            file("../escape.txt", b"bad"),
            file("ok/../../x", b"bad"),
            file("/abs/path.txt", b"abs"),
            file("./dot/kept.txt", b"dot"),
            file("good.txt", b"good"),
        ]),
    ));
    let installer = memory_installer(&temp, fetcher);

    let outcome = installer
        .install(&InstallRequest::new("http://x/a.tar.gz", "1"), None)
        .await
        .unwrap();

    assert_eq!(outcome.entries_skipped, 2);
    assert!(!temp.path().join("escape.txt").exists());
    assert!(!temp.path().join("x").exists());

    let files = files_under(&temp.path().join("proj-data"));
    let names: Vec<&str> = files.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["abs/path.txt", "dot/kept.txt", "good.txt"]);
}

#[tokio::test]
async fn test_archive_cannot_forge_version_marker() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with(
                "http://x/v1.tar.gz",
                tar_gz(&[file(VERSION_MARKER, b"9"), file("grid", b"1")]),
            )
            .with("http://x/v9.tar.gz", tar_gz(&[file("grid", b"9")])),
    );
    let installer = memory_installer(&temp, Arc::clone(&fetcher));

    let outcome = installer
        .install(&InstallRequest::new("http://x/v1.tar.gz", "1"), None)
        .await
        .unwrap();
    assert_eq!(outcome.entries_skipped, 1);

    let store = installer.open_store(None).await.unwrap();
    assert_eq!(VersionLedger::new(&store).read().await.as_deref(), Some("1"));

    let upgrade = installer
        .install(&InstallRequest::new("http://x/v9.tar.gz", "9"), None)
        .await
        .unwrap();
    assert_eq!(upgrade.status, InstallStatus::Installed);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_store_matches_archive_exactly() {
    let temp = TempDir::new().unwrap();
    let mut expected = BTreeMap::new();
    let mut entries = Vec::new();
    for i in 0..40usize {
        let name = format!("tiles/{}/{}.bin", i % 5, i);
        let data: Vec<u8> = (0..(i * 131 + 1)).map(|b| (b * 7 + i) as u8).collect();
        entries.push(file(&name, &data));
        expected.insert(name, data);
    }

    let fetcher = Arc::new(MemoryFetcher::default().with("http://x/a.tar.gz", tar_gz(&entries)));
    let installer = memory_installer(&temp, fetcher);
    installer
        .install(&InstallRequest::new("http://x/a.tar.gz", "1"), None)
        .await
        .unwrap();

    assert_eq!(files_under(&temp.path().join("proj-data")), expected);
}

#[tokio::test]
async fn test_progress_reports_are_monotonic() {
    let temp = TempDir::new().unwrap();
    let entries: Vec<Entry> = (0..10)
        .map(|i| file(&format!("f{}", i), &[i as u8; 4096]))
        .collect();
    let fetcher = Arc::new(MemoryFetcher::default().with("http://x/a.tar.gz", tar_gz(&entries)));
    let installer = memory_installer(&temp, fetcher);

    let reports: Arc<Mutex<Vec<ProgressReport>>> = Arc::default();
    let sink = Arc::clone(&reports);
    installer
        .install(
            &InstallRequest::new("http://x/a.tar.gz", "1"),
            Some(Box::new(move |r| sink.lock().unwrap().push(r))),
        )
        .await
        .unwrap();

    let reports = reports.lock().unwrap();
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|w| {
        w[1].bytes_consumed >= w[0].bytes_consumed && w[1].entries_written >= w[0].entries_written
    }));
    assert_eq!(reports.last().unwrap().entries_written, 10);
}

// ============================================================================
// Bridge and bundle handles
// ============================================================================

#[tokio::test]
async fn test_bridge_install_over_http() {
    let temp = TempDir::new().unwrap();
    let url = serve("200 OK", tar_gz(&[file("egm96_15.gtx", b"geoid")])).await;
    let client = InstallerClient::spawn(http_installer(&temp));

    let progress = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&progress);
    let first = client
        .install(
            InstallRequest::new(&url, "9"),
            Some(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();
    let second = client.install(InstallRequest::new(&url, "9"), None).await.unwrap();

    assert_eq!(first.status, InstallStatus::Installed);
    assert_eq!(second.status, InstallStatus::Cached);
    assert!(progress.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_bridge_carries_missing_parameter() {
    let temp = TempDir::new().unwrap();
    let client = InstallerClient::spawn(http_installer(&temp));

    let err = client
        .install(InstallRequest::new("", "1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
}

#[tokio::test]
async fn test_ensure_bundle_flat_store() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(MemoryFetcher::default().with(
        "http://x/a.tar.gz",
        tar_gz(&[file("b.tif", b"b"), file("a.tif", b"a")]),
    ));
    let installer = memory_installer(&temp, fetcher);

    let bundle = ensure_bundle(
        &installer,
        &InstallRequest::new("http://x/a.tar.gz", "1"),
        EngineCapabilities::files_only(),
        None,
    )
    .await
    .unwrap();

    let root = temp.path().join("proj-data");
    assert_eq!(
        bundle.mount,
        MountPlan::Files {
            files: vec![root.join("a.tif"), root.join("b.tif")]
        }
    );
}

#[tokio::test]
async fn test_ensure_bundle_nested_store_needs_directory_mount() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        MemoryFetcher::default().with("http://x/a.tar.gz", tar_gz(&[file("dir/a.tif", b"a")])),
    );
    let installer = memory_installer(&temp, fetcher);
    let request = InstallRequest::new("http://x/a.tar.gz", "1");

    let err = ensure_bundle(&installer, &request, EngineCapabilities::files_only(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedLayout);

    let bundle = ensure_bundle(&installer, &request, EngineCapabilities::directory(), None)
        .await
        .unwrap();
    assert_eq!(bundle.status, InstallStatus::Cached);
    assert!(matches!(bundle.mount, MountPlan::Directory { .. }));
}
