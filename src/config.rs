//! Configuration management for Shelfkeeper

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::storage::with_suffix;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub autosave: AutosaveConfig,
}

/// Where the library lives on disk
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Per-profile data directory
    pub data_dir: PathBuf,
    /// Index file name inside `data_dir`
    pub index_file: String,
    /// Content directory name inside `data_dir`
    pub content_dir: String,
    /// Legacy monolithic file name inside `data_dir`
    pub legacy_file: String,
    /// Appended to the legacy file name after migration
    pub backup_suffix: String,
    /// Prompt settings file name inside `data_dir`
    pub prompts_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutosaveConfig {
    /// Quiescence window before highlight edits are written
    pub debounce_ms: u64,
}

impl StorageConfig {
    /// Defaults rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StorageConfig {
            data_dir: data_dir.into(),
            index_file: "library-index.json".to_string(),
            content_dir: "content".to_string(),
            legacy_file: "docs.json".to_string(),
            backup_suffix: ".bak".to_string(),
            prompts_file: "prompts.json".to_string(),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }

    pub fn content_path(&self) -> PathBuf {
        self.data_dir.join(&self.content_dir)
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.data_dir.join(&self.legacy_file)
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.legacy_path(), &self.backup_suffix)
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.data_dir.join(&self.prompts_file)
    }
}

impl AutosaveConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        AutosaveConfig { debounce_ms: 500 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::new("./data"),
            autosave: AutosaveConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = StorageConfig::new(env::var("SHELF_DATA_DIR")?);

        Ok(Config {
            storage: StorageConfig {
                index_file: env::var("SHELF_INDEX_FILE").unwrap_or(defaults.index_file),
                content_dir: env::var("SHELF_CONTENT_DIR").unwrap_or(defaults.content_dir),
                legacy_file: env::var("SHELF_LEGACY_FILE").unwrap_or(defaults.legacy_file),
                backup_suffix: env::var("SHELF_BACKUP_SUFFIX").unwrap_or(defaults.backup_suffix),
                prompts_file: env::var("SHELF_PROMPTS_FILE").unwrap_or(defaults.prompts_file),
                data_dir: defaults.data_dir,
            },
            autosave: AutosaveConfig {
                debounce_ms: env::var("SHELF_AUTOSAVE_DEBOUNCE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(AutosaveConfig::default().debounce_ms),
            },
        })
    }
}
