//! Configuration Management
//!
//! Resolves where the storage directory lives and how large previews are.
//!
//! # Configuration Locations
//! - Local: `.sqlshelf/config.json` (per-project, in the current directory)
//! - Global: `~/.config/sqlshelf/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit value (CLI flag)
//! 2. `SQLSHELF_STORAGE_DIR` environment variable (storage directory only)
//! 3. Local config file
//! 4. Global config file
//! 5. Built-in default (current directory, preview limit 20)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::DEFAULT_PREVIEW_LIMIT;
use crate::error::{Result, ShelfError};

/// Environment variable overriding the configured storage directory
pub const STORAGE_DIR_ENV: &str = "SQLSHELF_STORAGE_DIR";

/// Persisted configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Directory holding the database files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    /// Default row limit for table previews
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_limit: Option<usize>,
}

impl ShelfConfig {
    /// Fill unset fields from `fallback`
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            storage_dir: self.storage_dir.or(fallback.storage_dir),
            preview_limit: self.preview_limit.or(fallback.preview_limit),
        }
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.sqlshelf/config.json`
    Local,
    /// Global config: `~/.config/sqlshelf/config.json`
    Global,
}

/// Get path to local config file (`.sqlshelf/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        ShelfError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".sqlshelf").join("config.json"))
}

/// Get path to global config file (`~/.config/sqlshelf/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ShelfError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("sqlshelf").join("config.json"))
}

/// Path of the config file for `location`
pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load a config file; a missing file is an empty config
pub fn load_config(path: &Path) -> Result<ShelfConfig> {
    if !path.exists() {
        return Ok(ShelfConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ShelfError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| ShelfError::config_error(format!("Invalid config file format: {e}")))
}

/// Save a config file, creating its parent directory if needed
pub fn save_config(path: &Path, config: &ShelfConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ShelfError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| ShelfError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| ShelfError::config_error(format!("Could not write config file: {e}")))?;

    tracing::debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Load local and global configs, local fields taking precedence
pub fn load_with_precedence() -> Result<ShelfConfig> {
    let local = load_config(&local_config_path()?)?;
    let global = match global_config_path() {
        Ok(path) => load_config(&path)?,
        Err(_) => ShelfConfig::default(),
    };
    Ok(local.or(global))
}

/// Fully resolved settings for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub storage_dir: PathBuf,
    pub preview_limit: usize,
}

/// Resolve settings from explicit values, the environment, and config files
pub fn resolve_settings(
    storage_dir: Option<PathBuf>,
    preview_limit: Option<usize>,
) -> Result<ResolvedSettings> {
    let env_dir = std::env::var_os(STORAGE_DIR_ENV).filter(|v| !v.is_empty()).map(PathBuf::from);
    let explicit = ShelfConfig { storage_dir: storage_dir.or(env_dir), preview_limit };

    resolve_from(explicit, load_with_precedence()?)
}

fn resolve_from(explicit: ShelfConfig, stored: ShelfConfig) -> Result<ResolvedSettings> {
    let merged = explicit.or(stored);

    let storage_dir = match merged.storage_dir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| {
            ShelfError::config_error(format!("Could not determine current directory: {e}"))
        })?,
    };

    Ok(ResolvedSettings {
        storage_dir,
        preview_limit: merged.preview_limit.unwrap_or(DEFAULT_PREVIEW_LIMIT),
    })
}

/// Record `storage_dir` (and optionally a preview limit) in the config at `location`
pub fn save_storage_dir(
    location: ConfigLocation,
    storage_dir: PathBuf,
    preview_limit: Option<usize>,
) -> Result<PathBuf> {
    let path = config_path(location)?;
    let existing = load_config(&path)?;
    let updated = ShelfConfig { storage_dir: Some(storage_dir), preview_limit }.or(existing);
    save_config(&path, &updated)?;
    Ok(path)
}
