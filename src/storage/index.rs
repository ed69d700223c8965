//! Index store
//!
//! One file holding the complete path -> record table. Every mutation
//! rewrites the whole table; there are no partial index updates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{codec, read_optional, with_suffix, write_atomic};
use crate::error::{Result, StoreError};
use crate::library::{normalize_table, DocumentRecord, IndexTable};

/// Suffix for an index file that could not be parsed
const CORRUPT_SUFFIX: &str = ".corrupt";

/// File-backed metadata table
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an index file is present at all
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Load the table
    ///
    /// Returns `None` when no index has been written yet. Records are decoded
    /// one by one: an unreadable record is skipped, the rest load normally.
    /// An unparseable file, or one with skipped records, is copied aside; a
    /// wholly unparseable file loads as an empty table.
    pub async fn load(&self) -> Result<Option<IndexTable>> {
        let Some(text) = read_optional(&self.path).await? else {
            tracing::debug!(path = %self.path.display(), "No index file yet");
            return Ok(None);
        };

        let raw = match codec::decode::<BTreeMap<String, serde_json::Value>>(&text) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Index is unreadable, starting from an empty table"
                );
                self.preserve_corrupt().await;
                return Ok(Some(IndexTable::new()));
            }
        };

        let mut table = IndexTable::new();
        let mut skipped = 0;
        for (path, value) in raw {
            match codec::decode_value::<DocumentRecord>(value) {
                Ok(record) => {
                    table.insert(path, record);
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping unreadable index record");
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            self.preserve_corrupt().await;
        }

        let repaired = normalize_table(&mut table);
        if repaired > 0 {
            tracing::warn!(repaired = repaired, "Repaired index records on load");
        }
        tracing::info!(count = table.len(), skipped = skipped, "Index loaded");
        Ok(Some(table))
    }

    /// Persist the complete table
    pub async fn save(&self, table: &IndexTable) -> Result<()> {
        let text = codec::encode(table)?;
        write_atomic(&self.path, &text).await?;
        tracing::debug!(count = table.len(), "Index saved");
        Ok(())
    }

    /// Remove the index file, if any
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    async fn preserve_corrupt(&self) {
        let target = with_suffix(&self.path, CORRUPT_SUFFIX);
        if let Err(e) = tokio::fs::copy(&self.path, &target).await {
            tracing::warn!(error = %e, "Failed to keep a copy of the unreadable index");
        } else {
            tracing::warn!(copy = %target.display(), "Kept a copy of the unreadable index");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ContentHandle, DocumentRecord};
    use tempfile::TempDir;

    fn record(path: &str, now: i64) -> DocumentRecord {
        DocumentRecord::new(path, ContentHandle::generate(path), now)
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("index.json"));

        assert!(!store.exists().await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("index.json"));

        let mut table = IndexTable::new();
        table.insert("/a.pdf".to_string(), record("/a.pdf", 10));
        table.insert("/b.pdf".to_string(), record("/b.pdf", 20));

        store.save(&table).await.unwrap();
        assert!(store.exists().await);

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, table);
    }

    #[tokio::test]
    async fn test_corrupt_index_loads_empty_and_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        tokio::fs::write(&path, "{ \"/a.pdf\": ").await.unwrap();

        let store = IndexStore::new(&path);
        let loaded = store.load().await.unwrap().unwrap();

        assert!(loaded.is_empty());
        let kept = tokio::fs::read_to_string(temp_dir.path().join("index.json.corrupt"))
            .await
            .unwrap();
        assert_eq!(kept, "{ \"/a.pdf\": ");
    }

    #[tokio::test]
    async fn test_bad_record_stays_contained() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        let text = serde_json::json!({
            "/a.pdf": { "name": "a.pdf", "contentHandle": "aaa", "order": 2.5 },
            "/b.pdf": { "name": "b.pdf", "contentHandle": "bbb", "order": 7 },
            "/c.pdf": { "name": null, "contentHandle": "ccc", "lastOpened": 3 },
            "/d.pdf": { "name": "d.pdf", "contentHandle": ["not", "a", "handle"] },
            "/e.pdf": "not a record"
        })
        .to_string();
        tokio::fs::write(&path, &text).await.unwrap();

        let store = IndexStore::new(&path);
        let loaded = store.load().await.unwrap().unwrap();

        let paths: Vec<&str> = loaded.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["/a.pdf", "/b.pdf", "/c.pdf"]);
        assert_eq!(loaded["/a.pdf"].order, Some(2.5));
        assert_eq!(loaded["/b.pdf"].order, Some(7.0));
        assert_eq!(loaded["/c.pdf"].name, "c.pdf");

        // The original file is kept for the skipped records
        let kept = tokio::fs::read_to_string(temp_dir.path().join("index.json.corrupt"))
            .await
            .unwrap();
        assert_eq!(kept, text);
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the index file should be makes the rename fail
        let path = temp_dir.path().join("index.json");
        tokio::fs::create_dir_all(path.join("occupied")).await.unwrap();

        let store = IndexStore::new(&path);
        let result = store.save(&IndexTable::new()).await;

        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::new(temp_dir.path().join("index.json"));

        store.save(&IndexTable::new()).await.unwrap();
        store.remove().await.unwrap();
        store.remove().await.unwrap();
        assert!(!store.exists().await);
    }
}
