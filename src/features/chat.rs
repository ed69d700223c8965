//! Question answering over a document
//!
//! Each question is answered with the extracted text as context (when there is
//! enough of it) and the exchange is appended to the stored chat history.

use std::sync::Arc;

use anyhow::{bail, Context};

use super::analysis::AnalysisPrompts;
use super::collaborators::{collect_completion, CompletionRequest, CompletionSource};
use crate::library::{ChatTurn, DocumentManager, DocumentPatch};

/// Extracted text at or below this many characters is not sent as context
const MIN_CONTEXT_CHARS: usize = 50;

pub struct ChatSession {
    manager: DocumentManager,
    model: Arc<dyn CompletionSource>,
}

impl ChatSession {
    pub fn new(manager: DocumentManager, model: Arc<dyn CompletionSource>) -> Self {
        Self { manager, model }
    }

    /// Ask a question about the document at `path` and record the exchange
    ///
    /// The saved system prompt is used as instructions. Nothing is stored
    /// when the model fails.
    pub async fn ask(&self, path: &str, question: &str) -> anyhow::Result<String> {
        let question = question.trim();
        if question.is_empty() {
            bail!("question is empty");
        }

        let content = self.manager.content(path).await?.unwrap_or_default();

        let prompts = AnalysisPrompts::load(&self.manager).await;
        let request = CompletionRequest {
            instructions: prompts.system,
            input: chat_prompt(content.extracted_text.as_deref(), question),
        };
        let answer = collect_completion(self.model.as_ref(), request)
            .await
            .with_context(|| format!("chat request failed for {}", path))?;

        let mut history = content.chat_history.unwrap_or_default();
        history.push(ChatTurn::new(question, answer.clone()));
        let turns = history.len();

        self.manager
            .save(path, DocumentPatch::new().chat_history(history))
            .await?;

        tracing::debug!(path = %path, turns = turns, "Chat turn saved");
        Ok(answer)
    }

    /// Stored exchanges for `path`, oldest first
    pub async fn history(&self, path: &str) -> anyhow::Result<Vec<ChatTurn>> {
        Ok(self
            .manager
            .content(path)
            .await?
            .and_then(|content| content.chat_history)
            .unwrap_or_default())
    }
}

/// User turn for `question`, with the document text attached when useful
pub fn chat_prompt(extracted_text: Option<&str>, question: &str) -> String {
    match extracted_text {
        Some(text) if text.chars().count() > MIN_CONTEXT_CHARS => {
            format!("Reference Document:\n{}\n\nQuestion: {}", text, question)
        }
        _ => question.to_string(),
    }
}
