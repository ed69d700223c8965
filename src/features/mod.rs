//! Reader features built on the document manager

pub mod analysis;
pub mod autosave;
pub mod chat;
pub mod collaborators;

pub use analysis::{AnalysisPrompts, AnalysisSection, Summarizer};
pub use autosave::{AutosaverHandle, HighlightAutosaver};
pub use chat::{chat_prompt, ChatSession};
pub use collaborators::{collect_completion, CompletionRequest, CompletionSource, TextExtractor};
