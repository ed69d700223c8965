//! Store service
//!
//! The only component with file-system access. It runs as its own task and
//! drains requests one at a time, so every index and content file has a
//! single writer. Callers talk to it exclusively through [`StoreHandle`].
//!
//! ```text
//!   StoreHandle (Clone)           mpsc         StoreService task
//!   ┌───────────────────┐   ──────────────▶   ┌──────────────────────┐
//!   │ .load_index()     │                     │ IndexStore           │
//!   │ .write_content()  │   ◀──────────────   │ ContentStore         │
//!   │ ...               │      oneshot        │ (migrated at start)  │
//!   └───────────────────┘                     └──────────────────────┘
//! ```

use tokio::sync::{mpsc, oneshot};

use crate::config::StorageConfig;
use crate::error::{Result, StoreError};
use crate::library::{ContentHandle, ContentPayload, IndexTable, PromptSettings};
use crate::storage::{ContentStore, IndexStore, MigrationOutcome, Migrator, PromptStore};

// ============================================================================
// Requests (internal)
// ============================================================================

/// Request sent from a handle to the service task
enum StoreRequest {
    LoadIndex {
        reply: oneshot::Sender<Result<Option<IndexTable>>>,
    },
    SaveIndex {
        table: IndexTable,
        reply: oneshot::Sender<Result<()>>,
    },
    ReadContent {
        handle: ContentHandle,
        reply: oneshot::Sender<Result<Option<ContentPayload>>>,
    },
    WriteContent {
        handle: ContentHandle,
        payload: ContentPayload,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteContent {
        handle: ContentHandle,
        reply: oneshot::Sender<Result<()>>,
    },
    LoadPrompts {
        reply: oneshot::Sender<Result<Option<PromptSettings>>>,
    },
    SavePrompts {
        settings: PromptSettings,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ============================================================================
// StoreHandle (public API)
// ============================================================================

/// Cloneable client side of the store service
///
/// Each method sends a request and awaits its reply. Once the service is gone
/// every call fails with [`StoreError::Shutdown`].
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreRequest>,
}

impl StoreHandle {
    /// Load the full index, `None` if none has been written yet
    pub async fn load_index(&self) -> Result<Option<IndexTable>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::LoadIndex { reply })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Replace the full index
    pub async fn save_index(&self, table: IndexTable) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::SaveIndex { table, reply })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Read a content payload, `None` if absent
    pub async fn read_content(&self, handle: &ContentHandle) -> Result<Option<ContentPayload>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::ReadContent {
            handle: handle.clone(),
            reply,
        })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Replace a content payload
    pub async fn write_content(&self, handle: &ContentHandle, payload: ContentPayload) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::WriteContent {
            handle: handle.clone(),
            payload,
            reply,
        })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Remove a content payload
    pub async fn delete_content(&self, handle: &ContentHandle) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::DeleteContent {
            handle: handle.clone(),
            reply,
        })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Load the user's prompt settings, `None` if none are saved
    pub async fn load_prompts(&self) -> Result<Option<PromptSettings>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::LoadPrompts { reply })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Replace the user's prompt settings
    pub async fn save_prompts(&self, settings: PromptSettings) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::SavePrompts { settings, reply })?;
        rx.await.map_err(|_| StoreError::Shutdown)?
    }

    /// Stop the service after the requests already queued
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreRequest::Shutdown { reply })?;
        rx.await.map_err(|_| StoreError::Shutdown)
    }

    fn send(&self, request: StoreRequest) -> Result<()> {
        self.tx.send(request).map_err(|_| StoreError::Shutdown)
    }
}

// ============================================================================
// StoreService (task)
// ============================================================================

/// Owner of the on-disk library
pub struct StoreService {
    index: IndexStore,
    content: ContentStore,
    prompts: PromptStore,
}

impl StoreService {
    pub fn new(index: IndexStore, content: ContentStore, prompts: PromptStore) -> Self {
        Self {
            index,
            content,
            prompts,
        }
    }

    /// Migrate any legacy library, then start serving requests
    pub async fn start(config: &StorageConfig) -> (StoreHandle, MigrationOutcome) {
        let service = Self::new(
            IndexStore::new(config.index_path()),
            ContentStore::with_local_storage(config.content_path()),
            PromptStore::new(config.prompts_path()),
        );

        let outcome = Migrator::new(
            &service.index,
            &service.content,
            config.legacy_path(),
            config.backup_path(),
        )
        .run()
        .await;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            migration = %outcome,
            "Store service starting"
        );

        (service.spawn(), outcome)
    }

    /// Spawn the request loop without running migration
    pub fn spawn(self) -> StoreHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        StoreHandle { tx }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<StoreRequest>) {
        while let Some(request) = rx.recv().await {
            match request {
                StoreRequest::LoadIndex { reply } => {
                    let _ = reply.send(self.index.load().await);
                }
                StoreRequest::SaveIndex { table, reply } => {
                    let result = self.index.save(&table).await;
                    if let Err(ref e) = result {
                        tracing::error!(error = %e, "Failed to save index");
                    }
                    let _ = reply.send(result);
                }
                StoreRequest::ReadContent { handle, reply } => {
                    let _ = reply.send(self.content.read(&handle).await);
                }
                StoreRequest::WriteContent {
                    handle,
                    payload,
                    reply,
                } => {
                    let result = self.content.write(&handle, &payload).await;
                    if let Err(ref e) = result {
                        tracing::error!(handle = %handle, error = %e, "Failed to write content");
                    }
                    let _ = reply.send(result);
                }
                StoreRequest::DeleteContent { handle, reply } => {
                    let result = self.content.delete(&handle).await;
                    if let Err(ref e) = result {
                        tracing::error!(handle = %handle, error = %e, "Failed to delete content");
                    }
                    let _ = reply.send(result);
                }
                StoreRequest::LoadPrompts { reply } => {
                    let _ = reply.send(self.prompts.load().await);
                }
                StoreRequest::SavePrompts { settings, reply } => {
                    let result = self.prompts.save(&settings).await;
                    if let Err(ref e) = result {
                        tracing::error!(error = %e, "Failed to save prompt settings");
                    }
                    let _ = reply.send(result);
                }
                StoreRequest::Shutdown { reply } => {
                    tracing::info!("Store service shutting down");
                    let _ = reply.send(());
                    break;
                }
            }
        }

        tracing::debug!("Store service stopped");
    }
}
