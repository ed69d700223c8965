//! Document library: data model, client-side manager and change events

pub mod events;
pub mod manager;
pub mod types;

pub use events::{EventBus, LibraryEvent};
pub use manager::{now_millis, sort_for_listing, DocumentManager, ListFilter};
pub use types::{
    default_name, normalize_table, Analysis, ChatTurn, ContentHandle, ContentPayload,
    DocumentPatch, DocumentRecord, Highlight, IndexTable, PromptSections, PromptSettings,
    HEAVY_KEYS,
};
