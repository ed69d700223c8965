//! Error types for the Shelfkeeper store

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Store-wide result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error type
///
/// Read-misses are never errors: absent index, content or legacy files are
/// reported as `None` by the stores. Everything here is either a write
/// failure, a rejected request, or a dead store service.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid content handle: {0:?}")]
    InvalidHandle(String),

    #[error("Store service shut down")]
    Shutdown,
}

impl StoreError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Blob codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode blob: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode blob: {0}")]
    Decode(#[source] serde_json::Error),
}
