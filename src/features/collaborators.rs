//! External services the reader features depend on
//!
//! PDF text extraction and the language model live outside this crate. They
//! are reached through these traits so hosts can plug in real backends and
//! tests can plug in fakes.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Pulls plain text out of a PDF
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> anyhow::Result<String>;
}

/// One prompt sent to the language model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System-level instructions
    pub instructions: String,
    /// User turn
    pub input: String,
}

/// Streams a completion back in text chunks
pub trait CompletionSource: Send + Sync {
    fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> BoxStream<'static, anyhow::Result<String>>;
}

/// Drain a completion stream into one string
///
/// Fails on the first chunk error; chunks already received are discarded.
pub async fn collect_completion(
    source: &dyn CompletionSource,
    request: CompletionRequest,
) -> anyhow::Result<String> {
    use futures::TryStreamExt;

    source
        .stream_completion(request)
        .try_fold(String::new(), |mut text, chunk| async move {
            text.push_str(&chunk);
            Ok(text)
        })
        .await
}
