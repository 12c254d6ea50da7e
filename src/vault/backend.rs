//! Where the sealed vault blob lives.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::VaultError;

/// Whole-blob persistence. Implementations never see plaintext.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// The current blob, or `None` when nothing was persisted yet.
    async fn load(&self) -> Result<Option<Vec<u8>>, VaultError>;

    /// Replace the persisted blob in full.
    async fn store(&self, blob: &[u8]) -> Result<(), VaultError>;
}

// ============================================================================
// File backend
// ============================================================================

/// Stores the blob in a single file, replaced atomically (temp file in the
/// same directory, then rename).
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
}

#[async_trait]
impl VaultBackend for FileBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, VaultError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::StoreAccess(format!(
                "cannot read '{}': {e}",
                self.path.display()
            ))),
        }
    }

    async fn store(&self, blob: &[u8]) -> Result<(), VaultError> {
        let path = self.path.clone();
        let blob = blob.to_vec();
        tokio::task::spawn_blocking(move || write_atomically(&path, &blob))
            .await
            .map_err(|e| VaultError::StoreWrite(format!("writer task failed: {e}")))?
    }
}

fn write_atomically(path: &Path, blob: &[u8]) -> Result<(), VaultError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| VaultError::StoreWrite(format!("cannot create '{}': {e}", dir.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| VaultError::StoreWrite(format!("cannot create temp file: {e}")))?;
    tmp.write_all(blob)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| VaultError::StoreWrite(format!("cannot write temp file: {e}")))?;
    tmp.persist(path)
        .map_err(|e| VaultError::StoreWrite(format!("cannot replace '{}': {e}", path.display())))?;

    debug!(path = %path.display(), bytes = blob.len(), "vault persisted");
    Ok(())
}

// ============================================================================
// Memory backend
// ============================================================================

/// In-process backend for tests and embedding. Clones share the same blob.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blob: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the raw blob, bypassing the cipher.
    pub fn set_raw(&self, blob: Vec<u8>) {
        *self.blob.lock() = Some(blob);
    }
}

#[async_trait]
impl VaultBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(self.blob.lock().clone())
    }

    async fn store(&self, blob: &[u8]) -> Result<(), VaultError> {
        *self.blob.lock() = Some(blob.to_vec());
        Ok(())
    }
}
