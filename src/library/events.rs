//! Library change notifications
//!
//! Published after every committed write so views (sidebar lists, favorite
//! counts) can re-render. Any number of subscribers; slow subscribers lag and
//! skip, they never block the writer.

use tokio::sync::broadcast;

/// Default number of buffered events per subscriber
const EVENT_CAPACITY: usize = 64;

/// What changed in the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// The mirror was (re)built from disk
    Loaded { count: usize },
    /// A document was created or updated through `save`
    Saved { path: String, created: bool },
    /// Manual ordering changed
    Reordered { count: usize },
    FavoriteToggled { path: String, is_favorite: bool },
    Deleted { path: String },
    /// Non-favorite documents were bulk removed
    HistoryCleared { removed: usize },
}

/// Publish side of the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LibraryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget; having no subscribers is fine
    pub fn publish(&self, event: LibraryEvent) {
        tracing::trace!(event = ?event, "Library event");
        let _ = self.tx.send(event);
    }
}
