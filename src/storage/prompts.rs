//! Prompt settings store
//!
//! The user's analysis prompts live in one small file next to the index. It
//! is optional: absence and damage both mean "use the built-in prompts".

use std::path::{Path, PathBuf};

use super::{codec, read_optional, write_atomic};
use crate::error::Result;
use crate::library::PromptSettings;

#[derive(Debug, Clone)]
pub struct PromptStore {
    path: PathBuf,
}

impl PromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved settings, `None` if there are none to use
    pub async fn load(&self) -> Result<Option<PromptSettings>> {
        let Some(text) = read_optional(&self.path).await? else {
            return Ok(None);
        };

        match codec::decode::<PromptSettings>(&text) {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Prompt settings are unreadable, using defaults"
                );
                Ok(None)
            }
        }
    }

    pub async fn save(&self, settings: &PromptSettings) -> Result<()> {
        let text = codec::encode(settings)?;
        write_atomic(&self.path, &text).await?;
        tracing::debug!(path = %self.path.display(), "Prompt settings saved");
        Ok(())
    }
}
