//! Content store
//!
//! Heavy per-document payloads, one addressable unit per content handle, so a
//! damaged payload only ever affects its own document. Supports pluggable
//! backends behind [`ContentStorage`]; the local filesystem backend keeps one
//! `<handle>.json` file per document.

use std::path::PathBuf;
use std::sync::Arc;

use super::{codec, read_optional, write_atomic};
use crate::error::{Result, StoreError};
use crate::library::{ContentHandle, ContentPayload};

// ============================================================================
// Content Storage Trait
// ============================================================================

/// Raw text storage for encoded payloads
#[async_trait::async_trait]
pub trait ContentStorage: Send + Sync {
    /// Read the encoded payload, `None` if nothing is stored under the handle
    async fn read(&self, handle: &ContentHandle) -> Result<Option<String>>;

    /// Replace the encoded payload
    async fn write(&self, handle: &ContentHandle, text: &str) -> Result<()>;

    /// Remove the payload; removing a missing payload succeeds
    async fn delete(&self, handle: &ContentHandle) -> Result<()>;
}

// ============================================================================
// Content Store (Main Implementation)
// ============================================================================

/// Payload store with a pluggable backend
#[derive(Clone)]
pub struct ContentStore {
    backend: Arc<dyn ContentStorage>,
}

impl ContentStore {
    /// Create with local filesystem storage rooted at `dir`
    pub fn with_local_storage(dir: PathBuf) -> Self {
        Self::with_backend(LocalContentStorage::new(dir))
    }

    pub fn with_backend(backend: impl ContentStorage + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Read a payload
    ///
    /// Absence is a normal state for documents whose heavy content has not
    /// been generated yet. An unparseable payload is logged and treated as
    /// absent.
    pub async fn read(&self, handle: &ContentHandle) -> Result<Option<ContentPayload>> {
        check_handle(handle)?;

        let Some(text) = self.backend.read(handle).await? else {
            return Ok(None);
        };

        match codec::decode::<ContentPayload>(&text) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                tracing::error!(
                    handle = %handle,
                    error = %e,
                    "Content payload is unreadable, treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Replace the payload stored under `handle`
    pub async fn write(&self, handle: &ContentHandle, payload: &ContentPayload) -> Result<()> {
        check_handle(handle)?;
        let text = codec::encode(payload)?;
        self.backend.write(handle, &text).await?;
        tracing::debug!(handle = %handle, bytes = text.len(), "Content written");
        Ok(())
    }

    /// Remove the payload stored under `handle`
    pub async fn delete(&self, handle: &ContentHandle) -> Result<()> {
        check_handle(handle)?;
        self.backend.delete(handle).await?;
        tracing::debug!(handle = %handle, "Content deleted");
        Ok(())
    }
}

fn check_handle(handle: &ContentHandle) -> Result<()> {
    if handle.is_valid() {
        Ok(())
    } else {
        Err(StoreError::InvalidHandle(handle.to_string()))
    }
}

// ============================================================================
// Local Filesystem Storage
// ============================================================================

/// One file per handle inside a single directory
pub struct LocalContentStorage {
    dir: PathBuf,
}

impl LocalContentStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn payload_path(&self, handle: &ContentHandle) -> PathBuf {
        self.dir.join(format!("{}.json", handle.as_str()))
    }
}

#[async_trait::async_trait]
impl ContentStorage for LocalContentStorage {
    async fn read(&self, handle: &ContentHandle) -> Result<Option<String>> {
        read_optional(&self.payload_path(handle)).await
    }

    async fn write(&self, handle: &ContentHandle, text: &str) -> Result<()> {
        write_atomic(&self.payload_path(handle), text).await
    }

    async fn delete(&self, handle: &ContentHandle) -> Result<()> {
        let path = self.payload_path(handle);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
