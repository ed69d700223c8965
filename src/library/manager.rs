//! Document manager
//!
//! The client-side mirror of the index plus the merge-write protocol used by
//! every feature (summarizer, chat, highlight editor, sidebar).
//!
//! # Consistency
//!
//! The mirror is rebuilt from one `load_index` at startup and afterwards only
//! changes through this type. Writes update the mirror first and then rewrite
//! the whole index through the store service. A failed write is returned to
//! the caller but the mirror is not rolled back; it is rebuilt from disk on
//! the next start.
//!
//! Concurrent `save` calls for the same path are not serialized: each one
//! reads, merges and writes the content payload on its own, so the last
//! writer wins and a heavy-field update can be lost between another call's
//! read and write.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::events::{EventBus, LibraryEvent};
use super::types::{ContentHandle, ContentPayload, DocumentPatch, DocumentRecord, IndexTable};
use crate::error::Result;
use crate::service::StoreHandle;

/// Legacy creation timestamp some older records still carry
const ADDED_AT_KEY: &str = "addedAt";

/// Which documents a listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFilter {
    #[default]
    All,
    Favorite,
}

impl ListFilter {
    fn includes(self, record: &DocumentRecord) -> bool {
        match self {
            ListFilter::All => true,
            ListFilter::Favorite => record.is_favorite,
        }
    }
}

/// Sidebar order: `order` descending (falling back to `lastOpened` when absent
/// or zero), then
/// `lastOpened` descending, then path
pub fn sort_for_listing(records: &mut [DocumentRecord]) {
    records.sort_by(|a, b| {
        b.sort_key()
            .total_cmp(&a.sort_key())
            .then_with(|| b.last_opened.cmp(&a.last_opened))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Client-side library manager
#[derive(Clone)]
pub struct DocumentManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    store: StoreHandle,
    mirror: RwLock<IndexTable>,
    events: EventBus,
}

impl DocumentManager {
    /// Build the mirror from the store
    ///
    /// A store that cannot be read yields an empty library rather than an
    /// error.
    pub async fn open(store: StoreHandle) -> Self {
        let manager = Self {
            inner: Arc::new(ManagerInner {
                store,
                mirror: RwLock::new(IndexTable::new()),
                events: EventBus::default(),
            }),
        };

        if let Err(e) = manager.reload().await {
            tracing::error!(error = %e, "Failed to load library index, starting empty");
        }

        manager
    }

    /// Replace the mirror with what is on disk
    pub async fn reload(&self) -> Result<usize> {
        let table = self.inner.store.load_index().await?.unwrap_or_default();
        let count = table.len();

        *self.inner.mirror.write() = table;

        tracing::info!(count = count, "Library loaded");
        self.inner.events.publish(LibraryEvent::Loaded { count });
        Ok(count)
    }

    /// The store this manager writes through
    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    /// Receive a [`LibraryEvent`] after every committed change
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.inner.events.subscribe()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, path: &str) -> Option<DocumentRecord> {
        self.inner.mirror.read().get(path).cloned()
    }

    /// Snapshot of the whole mirror
    pub fn all(&self) -> IndexTable {
        self.inner.mirror.read().clone()
    }

    /// Documents matching `filter`, in sidebar order
    pub fn list(&self, filter: ListFilter) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self
            .inner
            .mirror
            .read()
            .values()
            .filter(|record| filter.includes(record))
            .cloned()
            .collect();

        sort_for_listing(&mut records);
        records
    }

    pub fn count(&self, filter: ListFilter) -> usize {
        self.inner
            .mirror
            .read()
            .values()
            .filter(|record| filter.includes(record))
            .count()
    }

    /// Load the heavy content of a document
    ///
    /// `None` for unknown documents and for documents whose content has not
    /// been generated yet.
    pub async fn content(&self, path: &str) -> Result<Option<ContentPayload>> {
        let Some(handle) = self.handle_of(path) else {
            return Ok(None);
        };
        self.inner.store.read_content(&handle).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Merge a partial update into a document, creating it if needed
    ///
    /// Heavy fields are merged into the stored payload under the document's
    /// content handle; metadata fields are merged into the index entry and
    /// `lastOpened` is refreshed. Returns the resulting index entry.
    pub async fn save(&self, path: &str, mut patch: DocumentPatch) -> Result<DocumentRecord> {
        let now = now_millis();
        let (handle, created) = self.reserve(path, now);

        if patch.has_heavy_fields() {
            if let Err(e) = self.merge_content(&handle, &mut patch).await {
                if created {
                    self.release(path, &handle);
                }
                tracing::warn!(path = %path, error = %e, "Failed to save document content");
                return Err(e);
            }
        }

        let (record, snapshot) = {
            let mut mirror = self.inner.mirror.write();
            let record = mirror
                .entry(path.to_string())
                .or_insert_with(|| DocumentRecord::new(path, handle.clone(), now));

            if record.rank().is_none() {
                record.order = Some(fallback_order(record, now));
            }
            patch.apply_metadata(record);
            record.last_opened = now;

            (record.clone(), mirror.clone())
        };

        self.commit(snapshot).await?;

        tracing::debug!(path = %path, created = created, "Document saved");
        self.inner.events.publish(LibraryEvent::Saved {
            path: path.to_string(),
            created,
        });

        Ok(record)
    }

    /// Flip the favorite flag, returning the new state
    ///
    /// Unknown paths are left alone and report `false`.
    pub async fn toggle_favorite(&self, path: &str) -> Result<bool> {
        let (is_favorite, snapshot) = {
            let mut mirror = self.inner.mirror.write();
            let Some(record) = mirror.get_mut(path) else {
                tracing::warn!(path = %path, "Cannot toggle favorite of unknown document");
                return Ok(false);
            };
            record.is_favorite = !record.is_favorite;
            (record.is_favorite, mirror.clone())
        };

        self.commit(snapshot).await?;

        self.inner.events.publish(LibraryEvent::FavoriteToggled {
            path: path.to_string(),
            is_favorite,
        });
        Ok(is_favorite)
    }

    /// Rank documents by their position in `paths` (first = highest)
    pub async fn update_orders<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        let total = paths.len() as f64;

        let (count, snapshot) = {
            let mut mirror = self.inner.mirror.write();
            let mut count = 0;
            for (index, path) in paths.iter().enumerate() {
                if let Some(record) = mirror.get_mut(path.as_ref()) {
                    record.order = Some(total - index as f64);
                    count += 1;
                }
            }
            (count, mirror.clone())
        };

        self.commit(snapshot).await?;

        self.inner.events.publish(LibraryEvent::Reordered { count });
        Ok(())
    }

    /// Remove a document and its content
    ///
    /// The payload goes first so the index never points at a missing file.
    /// Returns whether the document existed.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let Some(handle) = self.handle_of(path) else {
            tracing::warn!(path = %path, "Document not found to delete");
            return Ok(false);
        };

        self.inner.store.delete_content(&handle).await?;

        let snapshot = {
            let mut mirror = self.inner.mirror.write();
            mirror.remove(path);
            mirror.clone()
        };

        self.commit(snapshot).await?;

        tracing::info!(path = %path, "Deleted document");
        self.inner.events.publish(LibraryEvent::Deleted {
            path: path.to_string(),
        });
        Ok(true)
    }

    /// Remove every non-favorite document and its content
    ///
    /// Individual payload deletions that fail are logged and leave a harmless
    /// orphan file; they do not stop the clear. Returns how many documents
    /// were removed.
    pub async fn clear_history(&self) -> Result<usize> {
        let doomed: Vec<(String, ContentHandle)> = {
            let mut mirror = self.inner.mirror.write();
            let doomed: Vec<(String, ContentHandle)> = mirror
                .values()
                .filter(|record| !record.is_favorite)
                .map(|record| (record.path.clone(), record.content_handle.clone()))
                .collect();
            for (path, _) in &doomed {
                mirror.remove(path);
            }
            doomed
        };

        if doomed.is_empty() {
            tracing::info!("No history items to clear");
            return Ok(0);
        }

        for (path, handle) in &doomed {
            if let Err(e) = self.inner.store.delete_content(handle).await {
                tracing::warn!(path = %path, error = %e, "Failed to delete content during clear");
            }
        }

        let snapshot = self.all();
        self.commit(snapshot).await?;

        let removed = doomed.len();
        tracing::info!(removed = removed, "Cleared history items");
        self.inner
            .events
            .publish(LibraryEvent::HistoryCleared { removed });
        Ok(removed)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn handle_of(&self, path: &str) -> Option<ContentHandle> {
        self.inner
            .mirror
            .read()
            .get(path)
            .map(|record| record.content_handle.clone())
    }

    /// Find or create the entry for `path` before the first suspension point,
    /// so concurrent saves of a new document agree on one content handle
    fn reserve(&self, path: &str, now: i64) -> (ContentHandle, bool) {
        let mut mirror = self.inner.mirror.write();
        if let Some(record) = mirror.get(path) {
            return (record.content_handle.clone(), false);
        }

        let record = DocumentRecord::new(path, ContentHandle::generate(path), now);
        let handle = record.content_handle.clone();
        mirror.insert(path.to_string(), record);
        (handle, true)
    }

    /// Undo a reservation whose content never made it to disk
    fn release(&self, path: &str, handle: &ContentHandle) {
        let mut mirror = self.inner.mirror.write();
        if mirror
            .get(path)
            .is_some_and(|record| record.content_handle == *handle)
        {
            mirror.remove(path);
        }
    }

    async fn merge_content(&self, handle: &ContentHandle, patch: &mut DocumentPatch) -> Result<()> {
        let mut payload = self
            .inner
            .store
            .read_content(handle)
            .await?
            .unwrap_or_default();

        patch.apply_content(&mut payload);

        self.inner.store.write_content(handle, payload).await
    }

    async fn commit(&self, snapshot: IndexTable) -> Result<()> {
        if let Err(e) = self.inner.store.save_index(snapshot).await {
            tracing::warn!(error = %e, "Failed to save index; in-memory library is ahead of disk");
            return Err(e);
        }
        Ok(())
    }
}

/// Order for a record that predates manual ordering; zero counts as unset
fn fallback_order(record: &DocumentRecord, now: i64) -> f64 {
    record
        .extra
        .get(ADDED_AT_KEY)
        .and_then(|value| value.as_f64())
        .filter(|added| *added != 0.0)
        .or(Some(record.last_opened).filter(|t| *t > 0).map(|t| t as f64))
        .unwrap_or(now as f64)
}
