//! Legacy layout migration
//!
//! Older installs kept every document, heavy fields included, in one
//! monolithic file. On startup that file is split into the index + content
//! layout exactly once:
//!
//! 1. Check: an index already exists -> nothing to do
//! 2. Detect: no legacy file -> start with an empty library
//! 3. Split: every entry gets a path-derived content handle and its heavy
//!    fields are written to the content store; entries that cannot be read
//!    are skipped and stay available in the backup
//! 4. Commit: write the index, then rename the legacy file to its backup name
//!
//! Nothing is written to the index before every payload has landed, and the
//! legacy file is only ever renamed, so a failed run can always be repeated.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use super::{codec, read_optional, ContentStore, IndexStore};
use crate::library::types::{lenient_opt_millis, lenient_rank, null_as_default};
use crate::library::{
    default_name, Analysis, ChatTurn, ContentHandle, ContentPayload, DocumentRecord, Highlight,
    IndexTable,
};

/// Keys that would collide with the handle field of the new record
const HANDLE_KEYS: [&str; 2] = ["contentHandle", "contentHash"];

/// The legacy table: path -> everything about the document, decoded entry by
/// entry into [`LegacyRecord`]s
type RawLegacyTable = BTreeMap<String, serde_json::Value>;

/// One entry of the legacy monolithic file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_millis")]
    pub last_opened: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_millis")]
    pub added_at: Option<i64>,
    #[serde(default, deserialize_with = "lenient_rank")]
    pub order: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_analyzing: bool,
    #[serde(default)]
    pub highlight_default_color: Option<String>,

    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub highlights: Option<Vec<Highlight>>,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatTurn>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LegacyRecord {
    /// Split into index metadata and heavy content
    pub fn split(self, path: &str) -> (DocumentRecord, ContentPayload) {
        let last_opened = self.last_opened.or(self.added_at).unwrap_or(0);
        // Zero means "unranked" at every step of the fallback
        let order = self
            .order
            .filter(|order| *order != 0.0)
            .or(self.added_at.filter(|t| *t != 0).map(|t| t as f64))
            .or(Some(last_opened).filter(|t| *t != 0).map(|t| t as f64));

        let mut extra = self.extra;
        for key in HANDLE_KEYS {
            extra.remove(key);
        }

        let record = DocumentRecord {
            path: path.to_string(),
            name: self
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| default_name(path)),
            content_handle: ContentHandle::for_path(path),
            last_opened,
            order,
            is_favorite: self.is_favorite,
            is_analyzing: self.is_analyzing,
            highlight_default_color: self.highlight_default_color,
            extra,
        };

        let payload = ContentPayload {
            extracted_text: self.extracted_text,
            analysis: self.analysis,
            highlights: self.highlights,
            chat_history: self.chat_history,
        };

        (record, payload)
    }
}

/// Result of a migration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// An index already existed; nothing was touched
    AlreadyMigrated,
    /// No legacy file; the library starts empty
    NoLegacy,
    /// Legacy entries were split into the new layout
    Migrated {
        documents: usize,
        /// Entries that could not be read and were left behind
        skipped: usize,
        /// Where the legacy file now lives, `None` if the rename failed
        backup: Option<PathBuf>,
    },
    /// A step failed before commit; the legacy file is untouched
    Failed { reason: String },
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOutcome::AlreadyMigrated => write!(f, "already migrated"),
            MigrationOutcome::NoLegacy => write!(f, "no legacy library"),
            MigrationOutcome::Migrated {
                documents, skipped, ..
            } => {
                write!(f, "migrated {} documents", documents)?;
                if *skipped > 0 {
                    write!(f, " ({} unreadable entries skipped)", skipped)?;
                }
                Ok(())
            }
            MigrationOutcome::Failed { reason } => write!(f, "migration failed: {}", reason),
        }
    }
}

/// Legacy-to-split converter
pub struct Migrator<'a> {
    index: &'a IndexStore,
    content: &'a ContentStore,
    legacy_path: PathBuf,
    backup_path: PathBuf,
}

impl<'a> Migrator<'a> {
    pub fn new(
        index: &'a IndexStore,
        content: &'a ContentStore,
        legacy_path: impl Into<PathBuf>,
        backup_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            content,
            legacy_path: legacy_path.into(),
            backup_path: backup_path.into(),
        }
    }

    /// Run the migration; never fails, the outcome says what happened
    pub async fn run(&self) -> MigrationOutcome {
        if self.index.exists().await {
            tracing::debug!("Index present, skipping legacy migration");
            return MigrationOutcome::AlreadyMigrated;
        }

        let text = match read_optional(&self.legacy_path).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!("No legacy library found");
                return MigrationOutcome::NoLegacy;
            }
            Err(e) => return self.fail(format!("reading legacy file: {}", e)),
        };

        let legacy: RawLegacyTable = match codec::decode(&text) {
            Ok(legacy) => legacy,
            Err(e) => return self.fail(format!("parsing legacy file: {}", e)),
        };

        tracing::info!(
            legacy = %self.legacy_path.display(),
            count = legacy.len(),
            "Migrating legacy library"
        );

        let mut table = IndexTable::new();
        let mut skipped = 0;
        for (path, value) in legacy {
            let entry: LegacyRecord = match codec::decode_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping unreadable legacy entry");
                    skipped += 1;
                    continue;
                }
            };
            let (record, payload) = entry.split(&path);

            if let Err(e) = self.content.write(&record.content_handle, &payload).await {
                return self.fail(format!("writing content for {}: {}", path, e));
            }

            table.insert(path, record);
        }

        if let Err(e) = self.index.save(&table).await {
            // A half-written index would make the next start skip migration
            if let Err(remove_err) = self.index.remove().await {
                tracing::error!(error = %remove_err, "Failed to remove partial index");
            }
            return self.fail(format!("writing index: {}", e));
        }

        let backup = match tokio::fs::rename(&self.legacy_path, &self.backup_path).await {
            Ok(()) => Some(self.backup_path.clone()),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    legacy = %self.legacy_path.display(),
                    "Index written but legacy file could not be renamed"
                );
                None
            }
        };

        tracing::info!(
            documents = table.len(),
            skipped = skipped,
            "Legacy library migrated"
        );

        MigrationOutcome::Migrated {
            documents: table.len(),
            skipped,
            backup,
        }
    }

    fn fail(&self, reason: String) -> MigrationOutcome {
        tracing::error!(
            legacy = %self.legacy_path.display(),
            reason = %reason,
            "Legacy migration failed, starting with an empty library"
        );
        MigrationOutcome::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        index: IndexStore,
        content: ContentStore,
        legacy: PathBuf,
        backup: PathBuf,
        content_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            Self {
                index: IndexStore::new(root.join("library-index.json")),
                content: ContentStore::with_local_storage(root.join("content")),
                legacy: root.join("docs.json"),
                backup: root.join("docs.json.bak"),
                content_dir: root.join("content"),
                dir,
            }
        }

        fn migrator(&self) -> Migrator<'_> {
            Migrator::new(&self.index, &self.content, &self.legacy, &self.backup)
        }

        async fn write_legacy(&self, value: serde_json::Value) {
            tokio::fs::write(&self.legacy, value.to_string()).await.unwrap();
        }
    }

    fn legacy_fixture() -> serde_json::Value {
        json!({
            "/papers/a.pdf": {
                "path": "/papers/a.pdf",
                "name": "a.pdf",
                "lastOpened": 1000,
                "order": 3,
                "isFavorite": true,
                "extractedText": "alpha text",
                "analysis": { "keywords": "alpha", "brief": "1. a", "summary": "All about a" },
                "highlights": [ { "pageIndex": 0, "color": "#FFFF98" } ],
                "chatHistory": [ { "q": "what?", "a": "alpha" } ]
            },
            "/papers/b.pdf": {
                "path": "/papers/b.pdf",
                "lastOpened": 2000,
                "addedAt": 1500,
                "extractedText": "beta text"
            },
            "/papers/c.pdf": {
                "name": "c.pdf",
                "lastOpened": 3000,
                "highlightDefaultColor": "green"
            }
        })
    }

    #[tokio::test]
    async fn test_no_legacy() {
        let fx = Fixture::new();
        assert_eq!(fx.migrator().run().await, MigrationOutcome::NoLegacy);
        assert!(!fx.index.exists().await);
    }

    #[tokio::test]
    async fn test_migrates_every_entry() {
        let fx = Fixture::new();
        fx.write_legacy(legacy_fixture()).await;

        let outcome = fx.migrator().run().await;
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                documents: 3,
                skipped: 0,
                backup: Some(fx.backup.clone()),
            }
        );

        let table = fx.index.load().await.unwrap().unwrap();
        assert_eq!(table.len(), 3);

        // Legacy file survives under its backup name only
        assert!(!fx.legacy.exists());
        assert!(fx.backup.exists());

        let a = &table["/papers/a.pdf"];
        assert_eq!(a.content_handle, ContentHandle::for_path("/papers/a.pdf"));
        assert_eq!(a.order, Some(3.0));
        assert!(a.is_favorite);

        let payload = fx.content.read(&a.content_handle).await.unwrap().unwrap();
        assert_eq!(payload.extracted_text.as_deref(), Some("alpha text"));
        assert_eq!(
            payload.analysis,
            Some(Analysis {
                keywords: Some("alpha".to_string()),
                brief: Some("1. a".to_string()),
                summary: Some("All about a".to_string()),
            })
        );
        assert_eq!(
            payload.highlights,
            Some(vec![json!({ "pageIndex": 0, "color": "#FFFF98" })])
        );
        assert_eq!(payload.chat_history, Some(vec![ChatTurn::new("what?", "alpha")]));

        let b = &table["/papers/b.pdf"];
        assert_eq!(b.name, "b.pdf");
        assert_eq!(b.order, Some(1500.0));

        let c = &table["/papers/c.pdf"];
        assert_eq!(c.order, Some(3000.0));
        assert_eq!(c.highlight_default_color.as_deref(), Some("green"));
        let c_payload = fx.content.read(&c.content_handle).await.unwrap().unwrap();
        assert!(c_payload.is_empty());

        // The index itself carries no heavy fields
        let raw = tokio::fs::read_to_string(fx.index.path()).await.unwrap();
        assert!(!raw.contains("alpha text"));
        assert!(!raw.contains("chatHistory"));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let fx = Fixture::new();
        fx.write_legacy(legacy_fixture()).await;
        fx.migrator().run().await;

        let index_before = tokio::fs::read(fx.index.path()).await.unwrap();
        let handle = ContentHandle::for_path("/papers/a.pdf");
        let content_file = fx.content_dir.join(format!("{}.json", handle));
        let content_before = tokio::fs::read(&content_file).await.unwrap();

        // Even with a legacy file back in place, an existing index wins
        fx.write_legacy(json!({ "/other.pdf": { "lastOpened": 1 } })).await;

        assert_eq!(fx.migrator().run().await, MigrationOutcome::AlreadyMigrated);
        assert_eq!(tokio::fs::read(fx.index.path()).await.unwrap(), index_before);
        assert_eq!(tokio::fs::read(&content_file).await.unwrap(), content_before);
    }

    #[tokio::test]
    async fn test_unparseable_legacy_is_left_alone() {
        let fx = Fixture::new();
        tokio::fs::write(&fx.legacy, "[ this is not a table").await.unwrap();

        let outcome = fx.migrator().run().await;
        assert!(matches!(outcome, MigrationOutcome::Failed { .. }));

        assert!(fx.legacy.exists());
        assert!(!fx.backup.exists());
        assert!(!fx.index.exists().await);
    }

    #[tokio::test]
    async fn test_content_failure_writes_no_index() {
        let fx = Fixture::new();
        fx.write_legacy(legacy_fixture()).await;
        // A plain file where the content directory should be
        tokio::fs::write(&fx.content_dir, "in the way").await.unwrap();

        let outcome = fx.migrator().run().await;
        assert!(matches!(outcome, MigrationOutcome::Failed { .. }));

        assert!(fx.legacy.exists());
        assert!(!fx.index.exists().await);

        // Clearing the obstacle lets a rerun succeed from the intact legacy file
        tokio::fs::remove_file(&fx.content_dir).await.unwrap();
        assert!(matches!(
            fx.migrator().run().await,
            MigrationOutcome::Migrated { documents: 3, .. }
        ));
    }

    #[test]
    fn test_split_drops_stale_handle_keys() {
        let legacy: LegacyRecord = serde_json::from_value(json!({
            "lastOpened": 7,
            "contentHash": "stale",
            "pinnedPage": 4
        }))
        .unwrap();

        let (record, payload) = legacy.split("/x.pdf");
        assert_eq!(record.content_handle, ContentHandle::for_path("/x.pdf"));
        assert!(!record.extra.contains_key("contentHash"));
        assert_eq!(record.extra.get("pinnedPage"), Some(&json!(4)));
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_odd_entries_do_not_sink_the_run() {
        let fx = Fixture::new();
        fx.write_legacy(json!({
            "/papers/a.pdf": { "name": null, "lastOpened": 10.0, "order": 1.5, "extractedText": "alpha" },
            "/papers/b.pdf": { "name": "b.pdf", "lastOpened": 20, "isFavorite": null },
            "/papers/c.pdf": { "name": "c.pdf", "chatHistory": "not a list" },
            "/papers/d.pdf": 42
        }))
        .await;

        let outcome = fx.migrator().run().await;
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                documents: 2,
                skipped: 2,
                backup: Some(fx.backup.clone()),
            }
        );

        let table = fx.index.load().await.unwrap().unwrap();
        let a = &table["/papers/a.pdf"];
        assert_eq!(a.name, "a.pdf");
        assert_eq!(a.order, Some(1.5));
        assert_eq!(a.last_opened, 10);
        assert!(!table["/papers/b.pdf"].is_favorite);
        assert!(!table.contains_key("/papers/c.pdf"));

        let payload = fx.content.read(&a.content_handle).await.unwrap().unwrap();
        assert_eq!(payload.extracted_text.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_index_failure_leaves_legacy_for_retry() {
        let mut fx = Fixture::new();
        fx.write_legacy(legacy_fixture()).await;

        // A plain file where the index's directory should be
        let blocker = fx.dir.path().join("meta");
        tokio::fs::write(&blocker, "in the way").await.unwrap();
        fx.index = IndexStore::new(blocker.join("library-index.json"));

        let outcome = fx.migrator().run().await;
        assert!(matches!(outcome, MigrationOutcome::Failed { .. }));
        assert!(fx.legacy.exists());
        assert!(!fx.backup.exists());
        assert!(!fx.index.exists().await);

        tokio::fs::remove_file(&blocker).await.unwrap();
        assert!(matches!(
            fx.migrator().run().await,
            MigrationOutcome::Migrated { documents: 3, .. }
        ));
        assert!(fx.index.exists().await);
    }

    #[tokio::test]
    async fn test_backup_rename_failure_still_counts() {
        let fx = Fixture::new();
        fx.write_legacy(legacy_fixture()).await;

        // A non-empty directory cannot be replaced by the rename
        tokio::fs::create_dir_all(fx.backup.join("occupied"))
            .await
            .unwrap();

        let outcome = fx.migrator().run().await;
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                documents: 3,
                skipped: 0,
                backup: None,
            }
        );
        assert!(fx.legacy.exists());
        assert_eq!(fx.index.load().await.unwrap().unwrap().len(), 3);

        // The complete index wins on the next start
        assert_eq!(fx.migrator().run().await, MigrationOutcome::AlreadyMigrated);
    }

    #[test]
    fn test_split_treats_zero_order_as_unranked() {
        let legacy: LegacyRecord = serde_json::from_value(json!({
            "order": 0,
            "addedAt": 0,
            "lastOpened": 9
        }))
        .unwrap();

        let (record, _) = legacy.split("/x.pdf");
        assert_eq!(record.order, Some(9.0));
    }
}
