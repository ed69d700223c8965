//! Blob codec
//!
//! Every persisted unit (index table, content payload, legacy table) is a
//! pretty-printed JSON document terminated by a single newline, so the files
//! stay diffable and hand-editable.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Serialize a value into its on-disk text form
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let mut text = serde_json::to_string_pretty(value).map_err(CodecError::Encode)?;
    text.push('\n');
    Ok(text)
}

/// Parse the on-disk text form of a value
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text.trim_end()).map_err(CodecError::Decode)
}

/// Convert one already-parsed entry of a larger unit
///
/// Tables are parsed entry by entry so one malformed record stays contained.
pub fn decode_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(CodecError::Decode)
}
