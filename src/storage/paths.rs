// FILE: src/storage/paths.rs
//! Path normalization and custom URI resolution.
//!
//! Every record and directory managed by this crate lives under a single
//! well-known `Inventory` subtree, mirrored across three parallel roots
//! (record metadata, asset data, asset variants). Callers may hand us
//! paths with backslashes or without the root prefix; everything is
//! normalized here before it touches storage.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::{Result, StoreError};

/// Fixed top-level segment all managed paths are rooted at.
pub const INVENTORY_ROOT: &str = "Inventory";

/// URI scheme for locally-stored base assets.
pub const LSTORE_PREFIX: &str = "lstore:///";

/// URI scheme for derived asset variants.
pub const LVARIANT_PREFIX: &str = "lvariant:///";

/// Subfolders seeded under the Inventory root on first init.
pub const DEFAULT_FOLDERS: &[&str] = &["Worlds", "Models", "Textures", "Materials", "Audio"];

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).unwrap());

/// Normalize a caller-supplied path: forward slashes only, no leading or
/// trailing separators, and always under the `Inventory` root.
pub fn normalize_path(path: &str) -> String {
    let fixed = path.replace('\\', "/");
    let trimmed = fixed.trim_matches('/');

    if trimmed.is_empty() {
        return INVENTORY_ROOT.to_string();
    }
    if trimmed == INVENTORY_ROOT || trimmed.starts_with("Inventory/") {
        return trimmed.to_string();
    }
    format!("{}/{}", INVENTORY_ROOT, trimmed)
}

/// Sanitize a display name for filesystem use. Invalid characters become
/// underscores, leading/trailing dots and spaces are trimmed, and the
/// result is capped at 64 characters. A name that sanitizes to nothing
/// becomes `unnamed`.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = INVALID_NAME_CHARS.replace_all(name, "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');

    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    trimmed.chars().take(64).collect()
}

/// Decode percent-escapes in a URI path component. Invalid escapes are
/// passed through untouched.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 3 <= bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Resolve a relative path against a root, rejecting any traversal that
/// would escape it. The input is percent-decoded first so encoded parent
/// segments cannot slip past the check.
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let decoded = percent_decode(relative).replace('\\', "/");
    let mut resolved = root.to_path_buf();
    let mut depth: usize = 0;

    for part in decoded.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                if depth == 0 {
                    return Err(StoreError::InvalidPath(format!(
                        "path escapes storage root: {}",
                        relative
                    )));
                }
                resolved.pop();
                depth -= 1;
            }
            name => {
                resolved.push(name);
                depth += 1;
            }
        }
    }

    if !resolved.starts_with(root) {
        return Err(StoreError::InvalidPath(format!(
            "path escapes storage root: {}",
            relative
        )));
    }

    Ok(resolved)
}

/// Extract the decoded relative path from an `lstore:///` URI.
pub fn lstore_relative(uri: &str) -> Option<String> {
    uri.strip_prefix(LSTORE_PREFIX)
        .map(|rest| percent_decode(rest.split('?').next().unwrap_or(rest)))
}

/// Extract (relative path, variant identifier) from an `lvariant:///` URI.
pub fn lvariant_parts(uri: &str) -> Option<(String, String)> {
    let rest = uri.strip_prefix(LVARIANT_PREFIX)?;
    let (path, query) = rest.split_once('?')?;
    if path.is_empty() || query.is_empty() {
        return None;
    }
    Some((percent_decode(path), percent_decode(query)))
}

/// The three parallel on-disk roots. All of them mirror the same relative
/// path structure under `Inventory`.
#[derive(Debug, Clone)]
pub struct StorageRoots {
    pub records: PathBuf,
    pub data: PathBuf,
    pub variants: PathBuf,
}

impl StorageRoots {
    pub fn from_config(config: &Config) -> Self {
        Self {
            records: config.records_path.clone(),
            data: config.data_path.clone(),
            variants: config.variant_path.clone(),
        }
    }

    /// Resolve an `lstore:///` URI to a file under the data root.
    /// Returns `Ok(None)` when the file does not exist; traversal escapes
    /// are an error.
    pub fn resolve_lstore(&self, uri: &str) -> Result<Option<PathBuf>> {
        let Some(relative) = lstore_relative(uri) else {
            return Ok(None);
        };
        let resolved = resolve_in_root(&self.data, &relative)?;
        if resolved.is_file() {
            Ok(Some(resolved))
        } else {
            Ok(None)
        }
    }

    /// Create the directory chain for a normalized path under every root
    /// that needs it.
    pub fn ensure_structure(&self, path: &str, include_variants: bool) -> Result<()> {
        let normalized = normalize_path(path);

        std::fs::create_dir_all(self.records.join(&normalized))?;
        std::fs::create_dir_all(self.data.join(&normalized))?;
        if include_variants {
            std::fs::create_dir_all(self.variants.join(&normalized))?;
        }
        Ok(())
    }

    /// First-run layout: the Inventory root plus the default content
    /// category folders, mirrored across all roots.
    pub fn seed_default_folders(&self, include_variants: bool) -> Result<()> {
        let mut roots: Vec<&Path> = vec![&self.records, &self.data];
        if include_variants {
            roots.push(&self.variants);
        }

        for root in roots {
            let inventory = root.join(INVENTORY_ROOT);
            std::fs::create_dir_all(&inventory)?;
            for folder in DEFAULT_FOLDERS {
                std::fs::create_dir_all(inventory.join(folder))?;
            }
        }

        tracing::info!(
            "[Storage] Initialized roots\nRecords: {}\nData: {}\nVariants: {}",
            self.records.display(),
            self.data.display(),
            self.variants.display()
        );
        Ok(())
    }
}

/// Short random suffix appended to per-item folders to avoid collisions.
pub fn item_folder_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
