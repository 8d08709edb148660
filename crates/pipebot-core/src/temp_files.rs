//! Chain-scoped temporary storage and owned file handles.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{bail, Context, Result};

use crate::cleanup::{CleanupReport, CleanupTracker};

const FALLBACK_FILE_NAME: &str = "file";

/// Owned handle to a temporary file created for a chain.
///
/// Handles are not `Clone`: moving one into the next step's input transfers
/// ownership. Release is performed by the chain's [`CleanupTracker`], never by the
/// handle itself.
#[derive(Debug, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
    file_name: String,
}

impl FileHandle {
    /// Backing path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name used when the file is uploaded.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lower-cased extension of the display name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase())
    }

    pub async fn size_bytes(&self) -> Result<u64> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("failed to stat {}", self.path.display()))?;
        Ok(metadata.len())
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))
    }
}

#[derive(Debug)]
struct StoreInner {
    dir: PathBuf,
    tracker: CleanupTracker,
    sequence: AtomicU64,
}

/// Factory for the temporary files of a single chain.
///
/// Every path is registered with the chain's tracker before it is written, so
/// partially written files are released too.
#[derive(Debug, Clone)]
pub struct TempFileStore {
    inner: Arc<StoreInner>,
}

impl TempFileStore {
    /// Creates `root/chain_id` and a tracker that removes it after release.
    pub async fn open(root: &Path, chain_id: &str) -> Result<Self> {
        if chain_id.trim().is_empty() {
            bail!("chain id cannot be empty");
        }
        let dir = root.join(sanitize_file_name(chain_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                tracker: CleanupTracker::new(Some(dir.clone())),
                dir,
                sequence: AtomicU64::new(1),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn tracker(&self) -> &CleanupTracker {
        &self.inner.tracker
    }

    /// Registers a fresh path for `file_name` without writing it.
    ///
    /// Used by tasks whose output is produced by an external encoder writing
    /// straight to disk.
    pub fn allocate(&self, file_name: &str) -> FileHandle {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let file_name = sanitize_file_name(file_name);
        let path = self.inner.dir.join(format!("{sequence:04}-{file_name}"));
        self.inner.tracker.track(&path);
        FileHandle { path, file_name }
    }

    /// Writes `bytes` to a newly allocated file.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<FileHandle> {
        let handle = self.allocate(file_name);
        tokio::fs::write(handle.path(), bytes)
            .await
            .with_context(|| format!("failed to write {}", handle.path().display()))?;
        Ok(handle)
    }

    /// Copies an existing file into chain storage.
    pub async fn import(&self, file_name: &str, source: &Path) -> Result<FileHandle> {
        let handle = self.allocate(file_name);
        tokio::fs::copy(source, handle.path())
            .await
            .with_context(|| {
                format!(
                    "failed to copy {} into {}",
                    source.display(),
                    handle.path().display()
                )
            })?;
        Ok(handle)
    }

    /// Drains the tracker, releasing every file this store created.
    pub async fn release_all(&self) -> CleanupReport {
        self.inner.tracker.drain().await
    }
}

/// Reduces `raw` to a single path component safe for the temp directory.
pub fn sanitize_file_name(raw: &str) -> String {
    let sanitized = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}
