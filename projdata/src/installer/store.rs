//! Directory-backed persistent store.
//!
//! A store is a named directory under a base directory. It holds the
//! extracted bundle tree plus the version marker written by the ledger.
//!
//! Files are written to a hidden sibling with a random `.partial` name and
//! renamed into place when their writer is closed, so a reader never sees a
//! half-written file under its final name.

use std::fs as std_fs;
use std::path::{Component, Path, PathBuf};

use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::archive::EntryKind;
use super::error::{InstallError, InstallResult};
use super::ledger::VERSION_MARKER;
use super::sanitize::sanitize_path;

/// One entry found when listing a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Path relative to the store root, `/`-separated.
    pub path: String,
    pub kind: EntryKind,
    /// File size in bytes, 0 for directories.
    pub size: u64,
}

/// A named store rooted in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (creating if needed) the store `name` under `base_dir`.
    ///
    /// `name` must be a single plain path segment.
    pub async fn open(base_dir: &Path, name: &str) -> InstallResult<Self> {
        validate_store_name(name)?;
        let root = base_dir.join(name);
        fs::create_dir_all(&root)
            .await
            .map_err(|e| InstallError::store_io(&root, e))?;
        Ok(Self { root })
    }

    /// Open a store at an existing root path without validation.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the store contents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a sanitized relative path onto the filesystem.
    ///
    /// Rejects segments the platform would read as anything other than a
    /// plain name, such as drive prefixes.
    fn resolve(&self, path: &str) -> InstallResult<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)) | Some(Component::CurDir), None) => {
                    resolved.push(segment)
                }
                _ => return Err(InstallError::InvalidPath(path.to_string())),
            }
        }
        Ok(resolved)
    }

    /// Create every directory along `path`. Existing directories are fine.
    pub async fn ensure_dir(&self, path: &str) -> InstallResult<PathBuf> {
        let dir = self.resolve(path)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| InstallError::store_io(&dir, e))?;
        Ok(dir)
    }

    /// Start writing the file at `path`, replacing any existing file.
    ///
    /// Parent directories are created as needed.
    pub async fn create_file(&self, path: &str) -> InstallResult<StoreFile> {
        let target = self.resolve(path)?;
        let (parent, file_name) = match (target.parent(), target.file_name()) {
            (Some(parent), Some(name)) if target != self.root => (parent.to_path_buf(), name),
            _ => return Err(InstallError::InvalidPath(path.to_string())),
        };

        fs::create_dir_all(&parent)
            .await
            .map_err(|e| InstallError::store_io(&parent, e))?;

        let prefix = format!(".{}.", file_name.to_string_lossy());
        let (file, partial) = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".partial")
            .tempfile_in(&parent)
            .map_err(|e| InstallError::store_io(&parent, e))?
            .into_parts();

        Ok(StoreFile {
            writer: BufWriter::new(File::from_std(file)),
            partial,
            target,
            written: 0,
        })
    }

    /// Write a whole file in one call.
    pub async fn write_file(&self, path: &str, contents: &[u8]) -> InstallResult<()> {
        let mut file = self.create_file(path).await?;
        file.write(contents).await?;
        file.close().await?;
        Ok(())
    }

    /// Remove everything directly under the root, recursively.
    ///
    /// Returns the number of top-level entries removed.
    pub async fn clear(&self) -> InstallResult<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)
                    .await
                    .map_err(|e| InstallError::store_io(&self.root, e))?;
                return Ok(0);
            }
            Err(e) => return Err(InstallError::store_io(&self.root, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InstallError::store_io(&self.root, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| InstallError::store_io(&path, e))?;

            let result = if file_type.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            result.map_err(|e| InstallError::store_io(&path, e))?;
            removed += 1;
        }

        debug!(root = %self.root.display(), removed, "Cleared store");
        Ok(removed)
    }

    /// List every file and directory in the store, sorted by path.
    ///
    /// The version marker is not part of the bundle and is left out.
    pub fn list(&self) -> InstallResult<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        if self.root.exists() {
            collect_entries(&self.root, "", &mut entries)?;
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

fn validate_store_name(name: &str) -> InstallResult<()> {
    match sanitize_path(name) {
        Some(clean) if clean == name && !clean.contains('/') && clean != "." => Ok(()),
        _ => Err(InstallError::InvalidPath(format!(
            "store name must be a single path segment: {:?}",
            name
        ))),
    }
}

fn collect_entries(dir: &Path, prefix: &str, out: &mut Vec<StoreEntry>) -> InstallResult<()> {
    let read = std_fs::read_dir(dir).map_err(|e| InstallError::store_io(dir, e))?;

    for entry in read {
        let entry = entry.map_err(|e| InstallError::store_io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if prefix.is_empty() && name == VERSION_MARKER {
            continue;
        }

        let path = entry.path();
        let metadata = entry
            .metadata()
            .map_err(|e| InstallError::store_io(&path, e))?;
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        if metadata.is_dir() {
            out.push(StoreEntry {
                path: relative.clone(),
                kind: EntryKind::Directory,
                size: 0,
            });
            collect_entries(&path, &relative, out)?;
        } else {
            out.push(StoreEntry {
                path: relative,
                kind: EntryKind::File,
                size: metadata.len(),
            });
        }
    }

    Ok(())
}

/// An open file write in progress.
///
/// Dropping it without [`StoreFile::close`] deletes the partial file.
pub struct StoreFile {
    writer: BufWriter<File>,
    partial: TempPath,
    target: PathBuf,
    written: u64,
}

impl StoreFile {
    /// Append a chunk.
    pub async fn write(&mut self, chunk: &[u8]) -> InstallResult<()> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| InstallError::store_io(&*self.partial, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and move the file into place. Returns the file size.
    pub async fn close(self) -> InstallResult<u64> {
        let Self {
            mut writer,
            partial,
            target,
            written,
        } = self;

        writer
            .shutdown()
            .await
            .map_err(|e| InstallError::store_io(&*partial, e))?;
        drop(writer);

        partial
            .persist(&target)
            .map_err(|e| InstallError::store_io(&target, e.error))?;
        Ok(written)
    }
}
