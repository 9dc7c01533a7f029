// FILE: src/variants.rs
//! Derived-asset variant cache.
//!
//! A variant is a transformed copy of a base asset (for example a
//! resized texture), addressed by `lvariant:///<path>?<identifier>`.
//! The identifier is an opaque cache key chosen by the caller; this
//! module only decides how to produce a file for it. A variant is
//! generated at most once per (base content, identifier) pair — the file
//! on disk is the real cache, the in-memory entries are bookkeeping.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::storage::paths::{self, StorageRoots};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tga"];
const MESH_EXTENSIONS: &[&str] = &["glb", "gltf", "obj", "fbx"];

/// In-memory entries kept per base asset.
const VARIANT_CACHE_CAPACITY: usize = 256;

static DIMENSIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:x(\d+))?$").unwrap());

/// Bookkeeping for one base asset's generated variants.
#[derive(Debug, Clone)]
pub struct VariantEntry {
    pub original_uri: String,
    pub variant_paths: HashMap<String, PathBuf>,
    pub last_accessed: DateTime<Utc>,
}

/// Produces the actual variant file. Swappable so tests can observe how
/// often generation really happens.
pub trait VariantGenerator: Send + Sync {
    fn generate(&self, base: &Path, destination: &Path, identifier: &str) -> Result<()>;
}

/// Texture resizer: the identifier names a maximum edge (`512` or
/// `512x512`); the output keeps the base image's aspect and format.
pub struct ImageVariantGenerator;

impl VariantGenerator for ImageVariantGenerator {
    fn generate(&self, base: &Path, destination: &Path, identifier: &str) -> Result<()> {
        let captures = DIMENSIONS.captures(identifier).ok_or_else(|| {
            StoreError::Validation(format!("unrecognized variant identifier: {}", identifier))
        })?;
        let width: u32 = captures[1].parse().map_err(|_| {
            StoreError::Validation(format!("bad variant dimensions: {}", identifier))
        })?;
        let height: u32 = captures
            .get(2)
            .map(|m| m.as_str().parse())
            .transpose()
            .map_err(|_| StoreError::Validation(format!("bad variant dimensions: {}", identifier)))?
            .unwrap_or(width);

        if width == 0 || height == 0 {
            return Err(StoreError::Validation(format!(
                "bad variant dimensions: {}",
                identifier
            )));
        }

        let format = base
            .extension()
            .and_then(|e| e.to_str())
            .and_then(image::ImageFormat::from_extension)
            .ok_or_else(|| {
                StoreError::Validation(format!("no image format for {}", base.display()))
            })?;

        let img = image::open(base)?;
        // thumbnail() preserves aspect ratio within the bounding box
        let resized = img.thumbnail(width, height);
        resized.save_with_format(destination, format)?;
        Ok(())
    }
}

enum AssetKind {
    Texture,
    Mesh,
    Other,
}

impl AssetKind {
    fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Self::Texture
        } else if MESH_EXTENSIONS.contains(&extension.as_str()) {
            Self::Mesh
        } else {
            Self::Other
        }
    }
}

pub struct VariantCache {
    roots: StorageRoots,
    entries: Mutex<LruCache<String, VariantEntry>>,
    generator: Box<dyn VariantGenerator>,
}

impl VariantCache {
    pub fn new(config: &Config) -> Self {
        Self::with_generator(config, Box::new(ImageVariantGenerator))
    }

    pub fn with_generator(config: &Config, generator: Box<dyn VariantGenerator>) -> Self {
        Self {
            roots: StorageRoots::from_config(config),
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(VARIANT_CACHE_CAPACITY).unwrap(),
            )),
            generator,
        }
    }

    /// Resolve an `lvariant:///<path>?<identifier>` URI. Absent result
    /// means the caller should fall back to the base asset.
    pub fn resolve_uri(&self, uri: &str) -> Option<PathBuf> {
        let (relative, identifier) = paths::lvariant_parts(uri)?;
        self.resolve(&relative, &identifier)
    }

    /// Resolution: deterministic cache path first (hit ends here), then
    /// locate the base asset, then generate only the requested variant.
    pub fn resolve(&self, relative: &str, identifier: &str) -> Option<PathBuf> {
        let variant_rel = format!("{}/{}", relative.trim_matches('/'), identifier);
        let variant_path = match paths::resolve_in_root(&self.roots.variants, &variant_rel) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("[Variants] Rejected variant path: {}", e);
                return None;
            }
        };

        // The in-memory entry does not guarantee the file exists; the
        // disk check is the authoritative one.
        if variant_path.is_file() {
            self.touch(relative, identifier, &variant_path);
            return Some(variant_path);
        }

        let base_path = match paths::resolve_in_root(&self.roots.data, relative) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("[Variants] Rejected base path: {}", e);
                return None;
            }
        };
        if !base_path.is_file() {
            return None;
        }

        match AssetKind::from_path(&base_path) {
            AssetKind::Texture => {}
            AssetKind::Mesh => {
                tracing::debug!(
                    "[Variants] No mesh variant generator for {}",
                    base_path.display()
                );
                return None;
            }
            AssetKind::Other => return None,
        }

        if let Some(parent) = variant_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("[Variants] Cannot create {}: {}", parent.display(), e);
                return None;
            }
        }

        if let Err(e) = self.generator.generate(&base_path, &variant_path, identifier) {
            tracing::error!(
                "[Variants] Error generating variant {} of {}: {}",
                identifier,
                base_path.display(),
                e
            );
            return None;
        }

        self.touch(relative, identifier, &variant_path);
        Some(variant_path)
    }

    /// Drop bookkeeping for a base asset (its files are deleted by the
    /// hierarchy layer).
    pub fn forget(&self, relative: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(relative);
        }
    }

    fn touch(&self, relative: &str, identifier: &str, path: &Path) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        if !entries.contains(relative) {
            entries.put(
                relative.to_string(),
                VariantEntry {
                    original_uri: format!("{}{}", paths::LSTORE_PREFIX, relative),
                    variant_paths: HashMap::new(),
                    last_accessed: Utc::now(),
                },
            );
        }

        if let Some(entry) = entries.get_mut(relative) {
            entry
                .variant_paths
                .insert(identifier.to_string(), path.to_path_buf());
            entry.last_accessed = Utc::now();
        }
    }
}
