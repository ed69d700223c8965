//! Shelfkeeper
//!
//! Document library persistence for an AI-assisted PDF reader.
//!
//! The library is split into a small always-loaded index of per-document
//! metadata and one content file per document holding the heavy fields
//! (extracted text, analysis, highlights, chat history). All file access goes
//! through a single store service task; features talk to the
//! [`DocumentManager`], which keeps an in-memory mirror of the index and
//! implements the merge-write protocol.
//!
//! # Modules
//!
//! - `storage`: blob codec, index store, content store, legacy migration
//! - `service`: the store service task and its cloneable handle
//! - `library`: data model, document manager, change events
//! - `features`: summarizer, chat, debounced highlight autosave

pub mod config;
pub mod error;
pub mod features;
pub mod library;
pub mod service;
pub mod storage;

pub use config::{AutosaveConfig, Config, StorageConfig};
pub use error::{CodecError, Result, StoreError};
pub use library::{
    ContentHandle, ContentPayload, DocumentManager, DocumentPatch, DocumentRecord, LibraryEvent,
    ListFilter, PromptSettings,
};
pub use service::{StoreHandle, StoreService};
pub use storage::MigrationOutcome;
