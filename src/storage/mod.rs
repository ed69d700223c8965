//! On-disk persistence
//!
//! Everything here runs inside the store service, which has exclusive access
//! to the data directory:
//!
//! - `codec`: text form of every persisted unit
//! - `index`: the single metadata table
//! - `content`: one payload file per content handle
//! - `migration`: one-time split of the legacy monolithic file
//! - `prompts`: the user's analysis prompt settings

pub mod codec;
pub mod content;
pub mod index;
pub mod migration;
pub mod prompts;

pub use content::{ContentStorage, ContentStore, LocalContentStorage};
pub use index::IndexStore;
pub use migration::{LegacyRecord, MigrationOutcome, Migrator};
pub use prompts::PromptStore;

use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Write `text` to `path` through a sibling temp file and a rename
///
/// Readers either see the previous file or the complete new one.
pub(crate) async fn write_atomic(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, text).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(&tmp, e));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }

    Ok(())
}

/// Read a text file, mapping "not found" to `None`
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// `name` with `suffix` appended to its final component
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}
