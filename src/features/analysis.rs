//! Document analysis
//!
//! Extracts the text of a PDF and asks the language model for three
//! independent sections (keywords, a three-line brief, a summary). Progress is
//! published through the `isAnalyzing` flag on the index entry; results land in
//! the content payload through the regular merge-write path.
//!
//! Prompts come from the user's saved settings and are re-read on every run,
//! so edits apply to the next analysis or regeneration without a restart.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};

use super::collaborators::{collect_completion, CompletionRequest, CompletionSource, TextExtractor};
use crate::library::{default_name, Analysis, DocumentManager, DocumentPatch, PromptSettings};

const DEFAULT_SYSTEM: &str = "You are a helpful reading assistant.";
const DEFAULT_KEYWORDS: &str = "Extract keywords.";
const DEFAULT_BRIEF: &str = "Give 3 bullet sentences.";
const DEFAULT_SUMMARY: &str = "Summarize.";

/// Effective prompt set: saved settings with blanks filled from the defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPrompts {
    pub system: String,
    pub keywords: String,
    pub brief: String,
    pub summary: String,
}

impl Default for AnalysisPrompts {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            keywords: DEFAULT_KEYWORDS.to_string(),
            brief: DEFAULT_BRIEF.to_string(),
            summary: DEFAULT_SUMMARY.to_string(),
        }
    }
}

impl AnalysisPrompts {
    /// Resolve saved settings; blank or missing entries use the defaults
    pub fn resolve(settings: Option<&PromptSettings>) -> Self {
        let Some(settings) = settings else {
            return Self::default();
        };

        Self {
            system: or_default(&settings.system, DEFAULT_SYSTEM),
            keywords: or_default(&settings.sections.keywords, DEFAULT_KEYWORDS),
            brief: or_default(&settings.sections.brief, DEFAULT_BRIEF),
            summary: or_default(&settings.sections.summary, DEFAULT_SUMMARY),
        }
    }

    /// Load and resolve the saved settings
    ///
    /// A store that cannot be reached yields the defaults.
    pub async fn load(manager: &DocumentManager) -> Self {
        match manager.store().load_prompts().await {
            Ok(settings) => Self::resolve(settings.as_ref()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load prompt settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn task(&self, section: AnalysisSection) -> &str {
        match section {
            AnalysisSection::Keywords => &self.keywords,
            AnalysisSection::Brief => &self.brief,
            AnalysisSection::Summary => &self.summary,
        }
    }

    /// Prompt for one section over `text`
    pub fn request(&self, section: AnalysisSection, text: &str) -> CompletionRequest {
        let task = self.task(section);
        CompletionRequest {
            instructions: format!("{}\n\n{}", self.system, task),
            input: format!("{}\n\n{}", task, text),
        }
    }
}

fn or_default(value: &str, default: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// One independently generated part of an [`Analysis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisSection {
    Keywords,
    Brief,
    Summary,
}

impl AnalysisSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSection::Keywords => "keywords",
            AnalysisSection::Brief => "brief",
            AnalysisSection::Summary => "summary",
        }
    }

    fn slot<'a>(&self, analysis: &'a mut Analysis) -> &'a mut Option<String> {
        match self {
            AnalysisSection::Keywords => &mut analysis.keywords,
            AnalysisSection::Brief => &mut analysis.brief,
            AnalysisSection::Summary => &mut analysis.summary,
        }
    }
}

/// Runs analyses and persists their results
pub struct Summarizer {
    manager: DocumentManager,
    extractor: Arc<dyn TextExtractor>,
    model: Arc<dyn CompletionSource>,
}

impl Summarizer {
    pub fn new(
        manager: DocumentManager,
        extractor: Arc<dyn TextExtractor>,
        model: Arc<dyn CompletionSource>,
    ) -> Self {
        Self {
            manager,
            extractor,
            model,
        }
    }

    /// Full analysis of a document
    ///
    /// Text is extracted before anything is written, so a document that
    /// cannot be read never gets a library entry. Returns `None` when the
    /// document has no text to analyze. Sections that fail are logged and
    /// left absent.
    pub async fn analyze(
        &self,
        path: &str,
        name: Option<&str>,
    ) -> anyhow::Result<Option<Analysis>> {
        let text = self
            .extractor
            .extract_text(Path::new(path))
            .await
            .with_context(|| format!("failed to extract text from {}", path))?;

        if text.trim().is_empty() {
            tracing::info!(path = %path, "No text to analyze");
            return Ok(None);
        }

        let name = name.map(str::to_string).unwrap_or_else(|| default_name(path));
        self.manager
            .save(path, DocumentPatch::new().name(name).analyzing(true))
            .await?;

        tracing::info!(path = %path, "Analyzing document");

        let prompts = AnalysisPrompts::load(&self.manager).await;
        let (keywords, brief, summary) = futures::join!(
            self.generate_logged(&prompts, path, AnalysisSection::Keywords, &text),
            self.generate_logged(&prompts, path, AnalysisSection::Brief, &text),
            self.generate_logged(&prompts, path, AnalysisSection::Summary, &text),
        );
        let analysis = Analysis {
            keywords,
            brief,
            summary,
        };

        self.manager
            .save(
                path,
                DocumentPatch::new()
                    .extracted_text(text)
                    .analysis(analysis.clone())
                    .analyzing(false),
            )
            .await?;

        tracing::info!(path = %path, "Analysis saved");
        Ok(Some(analysis))
    }

    /// Regenerate one section from previously extracted text
    ///
    /// Only that section changes; the other two are kept as stored.
    pub async fn regenerate_section(
        &self,
        path: &str,
        section: AnalysisSection,
    ) -> anyhow::Result<String> {
        let content = self.manager.content(path).await?.unwrap_or_default();
        let Some(text) = content.extracted_text.filter(|text| !text.is_empty()) else {
            bail!("no extracted text for {}; analyze it first", path);
        };

        let prompts = AnalysisPrompts::load(&self.manager).await;
        let generated = collect_completion(self.model.as_ref(), prompts.request(section, &text))
            .await
            .with_context(|| format!("failed to regenerate {} for {}", section.as_str(), path))?;

        let mut analysis = content.analysis.unwrap_or_default();
        *section.slot(&mut analysis) = Some(generated.clone());

        self.manager
            .save(path, DocumentPatch::new().analysis(analysis))
            .await?;

        tracing::info!(path = %path, section = section.as_str(), "Section regenerated");
        Ok(generated)
    }

    async fn generate_logged(
        &self,
        prompts: &AnalysisPrompts,
        path: &str,
        section: AnalysisSection,
        text: &str,
    ) -> Option<String> {
        match collect_completion(self.model.as_ref(), prompts.request(section, text)).await {
            Ok(generated) => Some(generated),
            Err(e) => {
                tracing::warn!(
                    path = %path,
                    section = section.as_str(),
                    error = %e,
                    "Section generation failed"
                );
                None
            }
        }
    }
}
