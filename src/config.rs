// FILE: src/config.rs
//! Configuration surface.
//!
//! Every knob the subsystem recognizes lives here, deserialized from a
//! single JSON document. Missing keys fall back to defaults, so an empty
//! file (or no file at all) yields a working local-only setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{SearchScope, SortMethod};
use crate::error::Result;

/// How the remote mirror is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Push/pull only when explicitly requested.
    Manual,
    /// Pull everything at startup, push everything at shutdown.
    AutomaticStartStop,
    /// Schedule a push after every local mutation.
    ImmediatePerChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master enable for the whole subsystem.
    pub enabled: bool,

    // Search behavior
    pub case_sensitive: bool,
    pub default_search_scope: SearchScope,
    pub default_sort_method: SortMethod,
    pub enable_search_integration: bool,
    pub index_tags: bool,
    pub index_content: bool,

    // Storage roots
    pub records_path: PathBuf,
    pub data_path: PathBuf,
    pub variant_path: PathBuf,
    pub store_asset_variants: bool,

    // Database backend
    pub use_database_backend: bool,
    pub database_path: PathBuf,

    // Remote mirror
    pub use_remote_storage: bool,
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub remote_path: String,
    pub sync_mode: SyncMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            case_sensitive: false,
            default_search_scope: SearchScope::All,
            default_sort_method: SortMethod::RecentlyAdded,
            enable_search_integration: true,
            index_tags: true,
            index_content: false,
            records_path: default_storage_dir("Records"),
            data_path: default_storage_dir("Data"),
            variant_path: default_storage_dir("Variants"),
            store_asset_variants: true,
            use_database_backend: true,
            database_path: default_storage_dir("custom_storage.db"),
            use_remote_storage: false,
            server_url: "https://example.com/nextcloud".to_string(),
            username: String::new(),
            password: String::new(),
            remote_path: "lodestore/storage".to_string(),
            sync_mode: SyncMode::AutomaticStartStop,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load a config file, falling back to defaults if it is missing or
    /// unreadable. A broken file is worth a warning but never fatal.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("[Config] Using defaults ({}: {})", path.display(), e);
                Self::default()
            }
        }
    }
}

fn default_storage_dir(subfolder: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lodestore")
        .join("LocalStorage")
        .join(subfolder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_local_only() {
        let config = Config::default();
        assert!(config.enabled);
        assert!(!config.use_remote_storage);
        assert!(!config.case_sensitive);
        assert_eq!(config.sync_mode, SyncMode::AutomaticStartStop);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "case_sensitive": true, "index_content": true }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.case_sensitive);
        assert!(config.index_content);
        assert!(config.enabled);
        assert_eq!(config.remote_path, "lodestore/storage");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/config.json"));
        assert!(config.enabled);
    }
}
