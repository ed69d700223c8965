//! Library data model
//!
//! A document is split in two: a lightweight [`DocumentRecord`] that lives in
//! the always-resident index, and a heavy [`ContentPayload`] stored in its own
//! file and addressed by the record's [`ContentHandle`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Keys that belong to the content payload and must never appear in the index
pub const HEAVY_KEYS: [&str; 4] = ["extractedText", "analysis", "highlights", "chatHistory"];

/// The full index: document path -> record
///
/// A `BTreeMap` keeps both iteration and the serialized file ordered by path.
pub type IndexTable = BTreeMap<String, DocumentRecord>;

/// Opaque highlight record produced by the annotation editor
pub type Highlight = serde_json::Value;

// ============================================================================
// Content Handle
// ============================================================================

/// Opaque reference from an index entry to its content file
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(String);

impl ContentHandle {
    /// Fresh handle for a newly created document
    pub fn generate(path: &str) -> Self {
        let salt = Uuid::new_v4();
        Self(sha256_hex(format!("{}{}", path, salt).as_bytes()))
    }

    /// Stable handle derived from the document path alone
    ///
    /// Used by migration so re-running it lands on the same content files.
    pub fn for_path(path: &str) -> Self {
        Self(sha256_hex(path.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the handle can safely name a file inside the content directory
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl From<&str> for ContentHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContentHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ============================================================================
// Index Entry
// ============================================================================

/// Lightweight per-document metadata kept in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Absolute path of the source PDF (index key)
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,

    /// Display name
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Content file reference, assigned once
    #[serde(default, alias = "contentHash", deserialize_with = "null_as_default")]
    pub content_handle: ContentHandle,

    /// Milliseconds since the Unix epoch
    #[serde(default, deserialize_with = "lenient_millis")]
    pub last_opened: i64,

    /// Manual sidebar rank, integer or fractional; absent on records that
    /// predate ordering
    #[serde(
        default,
        deserialize_with = "lenient_rank",
        serialize_with = "serialize_rank",
        skip_serializing_if = "Option::is_none"
    )]
    pub order: Option<f64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_favorite: bool,

    /// Transient progress flag set while analysis runs
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_analyzing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_default_color: Option<String>,

    /// Metadata keys this version does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentRecord {
    /// New record created on first open
    pub fn new(path: &str, content_handle: ContentHandle, now: i64) -> Self {
        Self {
            path: path.to_string(),
            name: default_name(path),
            content_handle,
            last_opened: now,
            order: Some(now as f64),
            is_favorite: false,
            is_analyzing: false,
            highlight_default_color: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Manual rank, with `0` counting as unranked
    pub fn rank(&self) -> Option<f64> {
        self.order.filter(|order| *order != 0.0)
    }

    /// Key used for sidebar ordering
    pub fn sort_key(&self) -> f64 {
        self.rank().unwrap_or(self.last_opened as f64)
    }

    /// Drop any heavy key that leaked into the metadata
    pub fn strip_heavy(&mut self) -> usize {
        HEAVY_KEYS
            .iter()
            .filter(|key| self.extra.remove(**key).is_some())
            .count()
    }
}

/// File name portion of a path, used when no display name was supplied
pub fn default_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Repair an index table after loading
///
/// Ensures every record carries its key as `path`, has a display name and a
/// content handle, and holds no heavy fields. Returns the number of records that were touched.
pub fn normalize_table(table: &mut IndexTable) -> usize {
    let mut repaired = 0;

    for (path, record) in table.iter_mut() {
        let mut touched = false;

        if record.path != *path {
            record.path = path.clone();
            touched = true;
        }
        if record.name.is_empty() {
            record.name = default_name(path);
            touched = true;
        }
        if record.content_handle.is_empty() {
            record.content_handle = ContentHandle::for_path(path);
            touched = true;
        }
        if record.strip_heavy() > 0 {
            touched = true;
        }

        if touched {
            repaired += 1;
        }
    }

    repaired
}

// ============================================================================
// Content Payload
// ============================================================================

/// Independently generated analysis sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(alias = "q")]
    pub question: String,

    #[serde(alias = "a")]
    pub answer: String,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Heavy per-document content, a sparse merge target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<Highlight>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_history: Option<Vec<ChatTurn>>,
}

impl ContentPayload {
    pub fn is_empty(&self) -> bool {
        self.extracted_text.is_none()
            && self.analysis.is_none()
            && self.highlights.is_none()
            && self.chat_history.is_none()
    }
}

// ============================================================================
// Partial Update
// ============================================================================

/// Sparse update applied by [`crate::DocumentManager::save`]
///
/// `None` means "leave as is". A supplied value replaces the stored one
/// wholesale; `analysis` in particular is not merged section by section.
/// `highlight_default_color` is doubly optional so it can be cleared:
/// `Some(None)` clears, `Some(Some(c))` sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub order: Option<f64>,
    pub is_favorite: Option<bool>,
    pub is_analyzing: Option<bool>,
    pub highlight_default_color: Option<Option<String>>,

    pub extracted_text: Option<String>,
    pub analysis: Option<Analysis>,
    pub highlights: Option<Vec<Highlight>>,
    pub chat_history: Option<Vec<ChatTurn>>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = Some(is_favorite);
        self
    }

    pub fn analyzing(mut self, is_analyzing: bool) -> Self {
        self.is_analyzing = Some(is_analyzing);
        self
    }

    pub fn highlight_default_color(mut self, color: Option<String>) -> Self {
        self.highlight_default_color = Some(color);
        self
    }

    pub fn extracted_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }

    pub fn analysis(mut self, analysis: Analysis) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn highlights(mut self, highlights: Vec<Highlight>) -> Self {
        self.highlights = Some(highlights);
        self
    }

    pub fn chat_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.chat_history = Some(history);
        self
    }

    /// Whether applying this patch touches the content payload
    pub fn has_heavy_fields(&self) -> bool {
        self.extracted_text.is_some()
            || self.analysis.is_some()
            || self.highlights.is_some()
            || self.chat_history.is_some()
    }

    /// Move supplied heavy fields into `payload`, leaving the rest untouched
    pub fn apply_content(&mut self, payload: &mut ContentPayload) {
        if let Some(text) = self.extracted_text.take() {
            payload.extracted_text = Some(text);
        }
        if let Some(analysis) = self.analysis.take() {
            payload.analysis = Some(analysis);
        }
        if let Some(highlights) = self.highlights.take() {
            payload.highlights = Some(highlights);
        }
        if let Some(history) = self.chat_history.take() {
            payload.chat_history = Some(history);
        }
    }

    /// Copy supplied metadata fields into `record`
    pub fn apply_metadata(&self, record: &mut DocumentRecord) {
        if let Some(ref name) = self.name {
            record.name = name.clone();
        }
        if let Some(order) = self.order {
            record.order = Some(order);
        }
        if let Some(is_favorite) = self.is_favorite {
            record.is_favorite = is_favorite;
        }
        if let Some(is_analyzing) = self.is_analyzing {
            record.is_analyzing = is_analyzing;
        }
        if let Some(ref color) = self.highlight_default_color {
            record.highlight_default_color = color.clone();
        }
    }
}

// ============================================================================
// Prompt Settings
// ============================================================================

/// User-edited analysis prompts as stored on disk
///
/// Empty strings mean "use the built-in prompt"; they are kept as written so
/// the settings editor shows exactly what the user saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSettings {
    #[serde(default, deserialize_with = "null_as_default")]
    pub system: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: PromptSections,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSections {
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub brief: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
}

// ============================================================================
// Lenient Field Decoding
// ============================================================================

// Records are written by several app versions; a wrong-typed scalar must not
// make the whole record unreadable.

/// Any JSON number, or a string holding one, as a finite `f64`
fn number_of(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn lenient_opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_of(&value).map(|n| n as i64))
}

pub(crate) fn lenient_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_millis(deserializer)?.unwrap_or(0))
}

pub(crate) fn lenient_rank<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_of(&value))
}

/// Whole ranks are written as integers
fn serialize_rank<S>(rank: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match rank {
        Some(r) if r.fract() == 0.0 && r.abs() < 9.0e15 => serializer.serialize_some(&(*r as i64)),
        Some(r) => serializer.serialize_some(r),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handles() {
        let a = ContentHandle::generate("/docs/a.pdf");
        let b = ContentHandle::generate("/docs/a.pdf");
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.is_valid());

        assert_eq!(
            ContentHandle::for_path("/docs/a.pdf"),
            ContentHandle::for_path("/docs/a.pdf")
        );

        assert!(!ContentHandle::from("../escape").is_valid());
        assert!(!ContentHandle::from("a/b").is_valid());
        assert!(!ContentHandle::default().is_valid());
    }

    #[test]
    fn test_default_name() {
        assert_eq!(default_name("/home/me/paper.pdf"), "paper.pdf");
        assert_eq!(default_name("C:\\Users\\me\\paper.pdf"), "paper.pdf");
        assert_eq!(default_name("paper.pdf"), "paper.pdf");
    }

    #[test]
    fn test_record_accepts_old_handle_spelling_and_keeps_unknown_keys() {
        let value = json!({
            "path": "/a.pdf",
            "name": "a.pdf",
            "contentHash": "abc123",
            "lastOpened": 5,
            "pinnedPage": 12
        });

        let record: DocumentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.content_handle.as_str(), "abc123");
        assert_eq!(record.order, None);
        assert_eq!(record.sort_key(), 5.0);
        assert_eq!(record.extra.get("pinnedPage"), Some(&json!(12)));

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(written["contentHandle"], json!("abc123"));
        assert_eq!(written["pinnedPage"], json!(12));
        assert!(written.get("contentHash").is_none());
    }

    #[test]
    fn test_normalize_strips_heavy_and_fills_gaps() {
        let value = json!({
            "/a.pdf": {
                "name": "a.pdf",
                "lastOpened": 1,
                "extractedText": "should not be here",
                "analysis": { "summary": "nor this" }
            }
        });

        let mut table: IndexTable = serde_json::from_value(value).unwrap();
        assert_eq!(normalize_table(&mut table), 1);

        let record = &table["/a.pdf"];
        assert_eq!(record.path, "/a.pdf");
        assert_eq!(record.content_handle, ContentHandle::for_path("/a.pdf"));
        assert!(record.extra.is_empty());

        // Second pass has nothing to do
        assert_eq!(normalize_table(&mut table), 0);
    }

    #[test]
    fn test_patch_merges_only_supplied_fields() {
        let mut payload = ContentPayload {
            extracted_text: Some("text".to_string()),
            chat_history: Some(vec![ChatTurn::new("q", "a")]),
            ..Default::default()
        };

        let mut patch = DocumentPatch::new().analysis(Analysis {
            summary: Some("X".to_string()),
            ..Default::default()
        });
        assert!(patch.has_heavy_fields());
        patch.apply_content(&mut payload);

        assert_eq!(payload.extracted_text.as_deref(), Some("text"));
        assert_eq!(payload.chat_history.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            payload.analysis.and_then(|a| a.summary).as_deref(),
            Some("X")
        );
    }

    #[test]
    fn test_patch_distinguishes_empty_from_unset() {
        let mut payload = ContentPayload {
            highlights: Some(vec![json!({ "pageIndex": 0 })]),
            ..Default::default()
        };

        DocumentPatch::new().apply_content(&mut payload);
        assert_eq!(payload.highlights.as_ref().map(Vec::len), Some(1));

        DocumentPatch::new()
            .highlights(Vec::new())
            .apply_content(&mut payload);
        assert_eq!(payload.highlights, Some(Vec::new()));
    }

    #[test]
    fn test_patch_clears_highlight_color() {
        let mut record = DocumentRecord::new("/a.pdf", ContentHandle::for_path("/a.pdf"), 1);
        record.highlight_default_color = Some("yellow".to_string());

        DocumentPatch::new().favorite(true).apply_metadata(&mut record);
        assert_eq!(record.highlight_default_color.as_deref(), Some("yellow"));
        assert!(record.is_favorite);

        DocumentPatch::new()
            .highlight_default_color(None)
            .apply_metadata(&mut record);
        assert!(record.highlight_default_color.is_none());
    }

    #[test]
    fn test_record_tolerates_odd_scalars() {
        let value = json!({
            "name": null,
            "contentHandle": "abc123",
            "lastOpened": 1700000000000.0,
            "order": 2.5,
            "isFavorite": null
        });

        let record: DocumentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.name, "");
        assert_eq!(record.last_opened, 1_700_000_000_000);
        assert_eq!(record.order, Some(2.5));
        assert!(!record.is_favorite);

        let numeric_string: DocumentRecord =
            serde_json::from_value(json!({ "order": "7", "lastOpened": "nope" })).unwrap();
        assert_eq!(numeric_string.order, Some(7.0));
        assert_eq!(numeric_string.last_opened, 0);
    }

    #[test]
    fn test_whole_ranks_written_as_integers() {
        let mut record = DocumentRecord::new("/a.pdf", ContentHandle::for_path("/a.pdf"), 10);
        record.order = Some(4.0);
        assert_eq!(serde_json::to_value(&record).unwrap()["order"], json!(4));

        record.order = Some(4.5);
        assert_eq!(serde_json::to_value(&record).unwrap()["order"], json!(4.5));
    }

    #[test]
    fn test_zero_order_is_unranked() {
        let mut record = DocumentRecord::new("/a.pdf", ContentHandle::for_path("/a.pdf"), 10);
        record.order = Some(0.0);

        assert_eq!(record.rank(), None);
        assert_eq!(record.sort_key(), 10.0);
    }

    #[test]
    fn test_prompt_settings_shape() {
        let settings: PromptSettings = serde_json::from_value(json!({
            "system": "Be brief.",
            "sections": { "keywords": "Tags.", "brief": null }
        }))
        .unwrap();

        assert_eq!(settings.system, "Be brief.");
        assert_eq!(settings.sections.keywords, "Tags.");
        assert_eq!(settings.sections.brief, "");
        assert_eq!(settings.sections.summary, "");

        let empty: PromptSettings = serde_json::from_value(json!({ "sections": null })).unwrap();
        assert_eq!(empty, PromptSettings::default());
    }
}
