//! Store configuration for nx
//!
//! Configuration lives in `config.toml` at the store root.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NxError, Result};

/// Current store format version
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store format version for compatibility checking
    #[serde(default = "default_version")]
    pub version: u32,

    /// Notebook spared by `cleanup_empty` and used as the import fallback
    #[serde(default = "default_notebook")]
    pub default_notebook: String,

    /// Path to an age-style key file; when set, callers install a cipher on
    /// the store and content is encrypted at rest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<PathBuf>,
}

impl StoreConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| NxError::file_read(path, e))?;
        let config: StoreConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NxError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| NxError::file_write(path, e))?;
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            version: STORE_FORMAT_VERSION,
            default_notebook: default_notebook(),
            encryption_key: None,
        }
    }
}

/// Default store root: `~/.nx`, falling back to `.nx` in the working
/// directory when the home directory cannot be determined.
pub fn default_store_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".nx"))
        .unwrap_or_else(|| PathBuf::from(".nx"))
}

fn default_version() -> u32 {
    STORE_FORMAT_VERSION
}

fn default_notebook() -> String {
    "default".to_string()
}
