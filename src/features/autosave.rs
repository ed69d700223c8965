//! Debounced highlight persistence
//!
//! The annotation editor reports every highlight change. Changes are held
//! until the document has been quiet for the debounce window, then the latest
//! highlight list is written through [`DocumentManager::save`].
//!
//! ```text
//!   modified(a) modified(a) modified(a)          window elapsed
//!   ────┬───────────┬───────────┬─────────────────────┬──────▶
//!                                                     save(a, latest)
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::library::{DocumentManager, DocumentPatch, Highlight};

enum AutosaveCommand {
    Modified {
        path: String,
        highlights: Vec<Highlight>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Background task that coalesces highlight edits
pub struct HighlightAutosaver {
    manager: DocumentManager,
    window: Duration,
    pending: Option<(String, Vec<Highlight>)>,
}

/// Client side of a running [`HighlightAutosaver`]
///
/// Dropping the handle lets the task write whatever is pending and exit;
/// [`AutosaverHandle::close`] does the same and waits for it.
pub struct AutosaverHandle {
    tx: mpsc::UnboundedSender<AutosaveCommand>,
    task: JoinHandle<()>,
}

impl HighlightAutosaver {
    pub fn spawn(manager: DocumentManager, window: Duration) -> AutosaverHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let saver = Self {
            manager,
            window,
            pending: None,
        };
        let task = tokio::spawn(saver.run(rx));
        AutosaverHandle { tx, task }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<AutosaveCommand>) {
        loop {
            let command = if self.pending.is_some() {
                match tokio::time::timeout(self.window, rx.recv()).await {
                    Ok(command) => command,
                    Err(_) => {
                        self.save_pending().await;
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };

            match command {
                Some(AutosaveCommand::Modified { path, highlights }) => {
                    // Switching documents writes the previous one right away
                    if self
                        .pending
                        .as_ref()
                        .is_some_and(|(pending, _)| *pending != path)
                    {
                        self.save_pending().await;
                    }
                    self.pending = Some((path, highlights));
                }
                Some(AutosaveCommand::Flush { reply }) => {
                    self.save_pending().await;
                    let _ = reply.send(());
                }
                None => {
                    self.save_pending().await;
                    break;
                }
            }
        }

        tracing::debug!("Highlight autosaver stopped");
    }

    async fn save_pending(&mut self) {
        let Some((path, highlights)) = self.pending.take() else {
            return;
        };

        let count = highlights.len();
        match self
            .manager
            .save(&path, DocumentPatch::new().highlights(highlights))
            .await
        {
            Ok(_) => tracing::debug!(path = %path, count = count, "Highlights saved"),
            Err(e) => tracing::warn!(path = %path, error = %e, "Failed to save highlights"),
        }
    }
}

impl AutosaverHandle {
    /// Report the current highlight list of a document
    pub fn modified(&self, path: impl Into<String>, highlights: Vec<Highlight>) {
        let command = AutosaveCommand::Modified {
            path: path.into(),
            highlights,
        };
        if self.tx.send(command).is_err() {
            tracing::warn!("Highlight autosaver is gone; edit dropped");
        }
    }

    /// Write any pending edit now
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(AutosaveCommand::Flush { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Write any pending edit and stop the task
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Highlight autosaver task failed");
        }
    }
}
