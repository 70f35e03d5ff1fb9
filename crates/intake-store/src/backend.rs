//! Where the serialized record collection lives.
//!
//! The store only ever reads or replaces the whole blob. Backends must make a
//! replacement atomic: a reader sees either the previous blob or the new one.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Current blob, or `None` when nothing has been stored yet.
    async fn load(&self) -> io::Result<Option<Vec<u8>>>;
    /// Replaces the blob as a whole.
    async fn store(&self, bytes: Vec<u8>) -> io::Result<()>;
    /// Human-readable location, used in log events.
    fn location(&self) -> String;
}

/// Blob kept in a single file. Writes go to a sibling temp file that is synced
/// to disk and then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

#[async_trait]
impl BlobBackend for FileBackend {
    async fn load(&self) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn store(&self, bytes: Vec<u8>) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        if let Err(err) = write_synced(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err);
        }
        if let Err(err) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err);
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// The rename must never expose a file whose contents are still in the page cache.
async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// In-process blob with switchable read and write failures.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(bytes: Vec<u8>) -> Self {
        Self {
            blob: Mutex::new(Some(bytes)),
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn load(&self) -> io::Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected read failure"));
        }
        Ok(self.snapshot())
    }

    async fn store(&self, bytes: Vec<u8>) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure"));
        }
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
