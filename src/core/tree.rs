// FILE: src/core/tree.rs
//! Owner-namespaced, path-addressed hierarchy over the record store.
//!
//! Nodes are a transient in-memory view: fetched once per node lifetime,
//! rebuildable from storage at any moment, never authoritative past the
//! operation they serve. The host dispatch boundary calls these
//! operations in place of its own hierarchy handling.

use std::sync::Arc;

use crate::engine::SearchIndex;
use crate::error::{Result, StoreError};
use crate::storage::paths::{self, StorageRoots};
use crate::storage::{Record, RecordBackend, LOCAL_OWNER};
use crate::variants::VariantCache;

/// Host-provided raw byte opener for arbitrary asset URIs. Used when
/// admitting new payloads into local storage.
pub trait AssetOpener: Send + Sync {
    fn open(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Filesystem opener: handles `lstore:///` URIs, `file://` URIs, and
/// plain paths.
pub struct FsAssetOpener {
    roots: StorageRoots,
}

impl FsAssetOpener {
    pub fn new(roots: StorageRoots) -> Self {
        Self { roots }
    }
}

impl AssetOpener for FsAssetOpener {
    fn open(&self, uri: &str) -> Result<Vec<u8>> {
        if let Some(relative) = paths::lstore_relative(uri) {
            let path = paths::resolve_in_root(&self.roots.data, &relative)?;
            return Ok(std::fs::read(path)?);
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(std::fs::read(path)?)
    }
}

/// Node lifecycle: children are fetched once on first access and cached
/// for the node's lifetime. Load failures leave the node Loaded with
/// empty children — there is no error state to get stuck in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Debug)]
pub struct TreeNode {
    /// Normalized path, always under the Inventory root.
    pub path: String,
    pub name: String,
    pub state: LoadState,
    pub records: Vec<Record>,
    /// Immediate child directory names, links included.
    pub subdirectories: Vec<String>,
    /// Link records presented as pseudo-subdirectories.
    pub links: Vec<Record>,
    /// Placeholder directories exist in memory only, with no backing
    /// storage until committed.
    pub placeholder: bool,
}

impl TreeNode {
    fn new(path: String) -> Self {
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            path,
            name,
            state: LoadState::Unloaded,
            records: Vec::new(),
            subdirectories: Vec::new(),
            links: Vec::new(),
            placeholder: false,
        }
    }
}

pub struct RecordTree {
    backend: Arc<dyn RecordBackend>,
    roots: StorageRoots,
    opener: Arc<dyn AssetOpener>,
    index: Option<Arc<SearchIndex>>,
    variants: Option<Arc<VariantCache>>,
    store_variants: bool,
}

impl RecordTree {
    pub fn new(
        config: &crate::config::Config,
        backend: Arc<dyn RecordBackend>,
        opener: Arc<dyn AssetOpener>,
        index: Option<Arc<SearchIndex>>,
        variants: Option<Arc<VariantCache>>,
    ) -> Self {
        Self {
            backend,
            roots: StorageRoots::from_config(config),
            opener,
            index,
            variants,
            store_variants: config.store_asset_variants,
        }
    }

    pub fn backend(&self) -> &Arc<dyn RecordBackend> {
        &self.backend
    }

    /// Open and load a hierarchy node.
    pub fn open(&self, path: &str) -> TreeNode {
        let mut node = TreeNode::new(paths::normalize_path(path));
        self.load(&mut node);
        node
    }

    pub fn open_root(&self) -> TreeNode {
        self.open(paths::INVENTORY_ROOT)
    }

    /// Unloaded -> Loading -> Loaded. Idempotent once loaded.
    pub fn load(&self, node: &mut TreeNode) {
        if node.state == LoadState::Loaded {
            return;
        }
        node.state = LoadState::Loading;

        // The backing directory materializes on first access.
        if let Err(e) = self.roots.ensure_structure(&node.path, self.store_variants) {
            tracing::error!("[Tree] Failed to materialize {}: {}", node.path, e);
        }

        for record in self.backend.records_in_directory(LOCAL_OWNER, &node.path) {
            if record.is_link() {
                node.subdirectories.push(record.name.clone());
                node.links.push(record);
            } else {
                node.records.push(record);
            }
        }

        for name in self.backend.subdirectories(LOCAL_OWNER, &node.path) {
            if !node.subdirectories.contains(&name) {
                node.subdirectories.push(name);
            }
        }

        node.state = LoadState::Loaded;
    }

    /// Admit a new item: persist its payload (and optional thumbnail)
    /// under a collision-proof per-item folder, save the record, update
    /// the node and the search index.
    pub fn add_item(
        &self,
        node: &mut TreeNode,
        name: &str,
        data_uri: &str,
        thumbnail_uri: Option<&str>,
        tags: &[String],
    ) -> Option<Record> {
        match self.try_add_item(node, name, data_uri, thumbnail_uri, tags) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::error!("[Tree] Error adding item '{}': {}", name, e);
                None
            }
        }
    }

    fn try_add_item(
        &self,
        node: &mut TreeNode,
        name: &str,
        data_uri: &str,
        thumbnail_uri: Option<&str>,
        tags: &[String],
    ) -> Result<Record> {
        let sanitized = paths::sanitize_file_name(name);
        let item_folder = format!("{}_{}", sanitized, paths::item_folder_suffix());
        let item_path = format!("{}/{}", node.path, item_folder);

        self.roots.ensure_structure(&item_path, self.store_variants)?;

        let data = self.opener.open(data_uri)?;
        let extension = uri_extension(data_uri).unwrap_or_else(|| "json".to_string());
        let file_name = format!("{}.{}", sanitized, extension);
        std::fs::write(self.roots.data.join(&item_path).join(&file_name), &data)?;
        let asset_uri = format!("{}{}/{}", paths::LSTORE_PREFIX, item_path, file_name);

        let thumbnail = match thumbnail_uri {
            Some(thumb) if self.store_variants => {
                let thumb_extension = uri_extension(thumb).unwrap_or_else(|| "png".to_string());
                let thumb_name = format!("{}_thumb.{}", sanitized, thumb_extension);
                let bytes = self.opener.open(thumb)?;
                std::fs::write(self.roots.data.join(&item_path).join(&thumb_name), bytes)?;
                Some(format!("{}{}/{}", paths::LSTORE_PREFIX, item_path, thumb_name))
            }
            Some(thumb) => Some(thumb.to_string()),
            None => None,
        };

        let mut record = Record::new_object(name, &item_path, asset_uri, thumbnail);
        record.tags = tags.iter().cloned().collect();

        if !self.backend.save_record(&mut record) {
            return Err(StoreError::State(format!("failed to save record '{}'", name)));
        }

        node.records.push(record.clone());
        if let Some(index) = &self.index {
            index.index_record(&record);
        }

        Ok(record)
    }

    /// Create a subdirectory. A backing path that already exists on disk
    /// is always a duplicate-name error, tracked in memory or not.
    pub fn add_subdirectory(
        &self,
        node: &mut TreeNode,
        name: &str,
        placeholder_only: bool,
    ) -> Result<TreeNode> {
        let sanitized = paths::sanitize_file_name(name);
        let backing = self
            .roots
            .records
            .join(&node.path)
            .join(&sanitized);

        if backing.exists() {
            return Err(StoreError::Validation(format!(
                "Subdirectory with name '{}' already exists",
                sanitized
            )));
        }

        if !placeholder_only {
            let child_path = format!("{}/{}", node.path, sanitized);
            self.roots.ensure_structure(&child_path, self.store_variants)?;
            self.backend
                .create_directory(LOCAL_OWNER, &node.path, &sanitized);
        }

        node.subdirectories.push(sanitized.clone());

        let mut child = TreeNode::new(format!("{}/{}", node.path, sanitized));
        child.state = LoadState::Loaded;
        child.placeholder = placeholder_only;
        Ok(child)
    }

    /// Create a link record, presented as a pseudo-subdirectory.
    pub fn add_link(&self, node: &mut TreeNode, name: &str, target_uri: &str) -> Option<Record> {
        let sanitized = paths::sanitize_file_name(name);

        if let Err(e) = self.roots.ensure_structure(&node.path, self.store_variants) {
            tracing::error!("[Tree] Error preparing link directory: {}", e);
            return None;
        }

        let mut record = Record::new_link(&sanitized, &node.path, target_uri.to_string());
        if !self.backend.save_record(&mut record) {
            tracing::error!("[Tree] Error saving link '{}'", sanitized);
            return None;
        }

        node.subdirectories.push(sanitized);
        node.links.push(record.clone());
        if let Some(index) = &self.index {
            index.index_record(&record);
        }

        Some(record)
    }

    /// Local records have no cloud listing to publish to; flipping the
    /// public flag on this namespace is always a caller error.
    pub fn set_public_recursively(&self, node: &TreeNode) -> Result<()> {
        Err(StoreError::Validation(format!(
            "Cannot set public on local directory '{}'",
            node.path
        )))
    }

    /// Delete one item: in-memory entry, backing asset + thumbnail,
    /// derived variants, the record itself. Empty parent directories are
    /// pruned opportunistically.
    pub fn delete_item(&self, node: &mut TreeNode, record: &Record) -> bool {
        let Some(position) = node
            .records
            .iter()
            .position(|r| r.record_id == record.record_id)
        else {
            return false;
        };
        node.records.remove(position);

        if let Some(uri) = record.local_asset_uri() {
            if let Some(relative) = paths::lstore_relative(uri) {
                self.delete_variants_for(&relative);
            }
        }

        // Backend delete covers the record storage plus the owned asset
        // and thumbnail files.
        let deleted = self.backend.delete_record(&record.record_id);

        if let Some(uri) = record.local_asset_uri() {
            if let Some(relative) = paths::lstore_relative(uri) {
                self.sweep_item_folder(&relative);
            }
        }

        if let Some(index) = &self.index {
            index.remove_record(&record.record_id);
        }

        deleted
    }

    /// Delete a subdirectory and everything below it, depth-first:
    /// subdirectories before records at each level.
    pub fn delete_subdirectory(&self, node: &mut TreeNode, name: &str) -> Result<()> {
        let Some(position) = node.subdirectories.iter().position(|n| n == name) else {
            return Err(StoreError::Validation(
                "Directory doesn't contain given subdirectory".to_string(),
            ));
        };

        // A link pseudo-directory only owns its record.
        if let Some(link_position) = node.links.iter().position(|l| l.name == name) {
            let link = node.links.remove(link_position);
            node.subdirectories.remove(position);
            self.backend.delete_record(&link.record_id);
            if let Some(index) = &self.index {
                index.remove_record(&link.record_id);
            }
            return Ok(());
        }

        node.subdirectories.remove(position);
        let child_path = format!("{}/{}", node.path, name);
        self.recursive_delete(&child_path);

        // Sweep whatever the per-item deletes left behind: rows in the
        // database backend, directories in the file backend.
        self.backend.delete_directory(LOCAL_OWNER, &node.path, name);
        Ok(())
    }

    fn recursive_delete(&self, path: &str) {
        let mut child = self.open(path);

        for name in child.subdirectories.clone() {
            if let Some(link_position) = child.links.iter().position(|l| l.name == name) {
                let link = child.links.remove(link_position);
                self.backend.delete_record(&link.record_id);
                if let Some(index) = &self.index {
                    index.remove_record(&link.record_id);
                }
            } else {
                self.recursive_delete(&format!("{}/{}", path, name));
            }
        }

        for record in child.records.clone() {
            self.delete_item(&mut child, &record);
        }
    }

    fn delete_variants_for(&self, asset_relative: &str) {
        if !self.store_variants {
            return;
        }
        if let Some(cache) = &self.variants {
            cache.forget(asset_relative);
        }
        match paths::resolve_in_root(&self.roots.variants, asset_relative) {
            Ok(dir) if dir.is_dir() => {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!("[Tree] Failed to delete variants {}: {}", dir.display(), e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("[Tree] Skipping variant cleanup: {}", e),
        }
    }

    /// Remove leftover files in the item's data folder and drop the
    /// folder chain where it has become empty. Best effort only.
    fn sweep_item_folder(&self, asset_relative: &str) {
        let Ok(asset_path) = paths::resolve_in_root(&self.roots.data, asset_relative) else {
            return;
        };
        let Some(folder) = asset_path.parent() else {
            return;
        };

        if let Ok(entries) = std::fs::read_dir(folder) {
            for entry in entries.filter_map(|e| e.ok()) {
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        tracing::warn!(
                            "[Tree] Failed to delete associated file {}: {}",
                            entry.path().display(),
                            e
                        );
                    }
                }
            }
        }

        let empty = std::fs::read_dir(folder)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            let _ = std::fs::remove_dir(folder);
        }
    }
}

fn uri_extension(uri: &str) -> Option<String> {
    let path = uri.split('?').next().unwrap_or(uri);
    let segment = path.rsplit('/').next()?;
    let (_, extension) = segment.rsplit_once('.')?;
    if extension.is_empty()
        || extension.len() > 5
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(extension.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::config::Config;
    use crate::storage::FileTreeBackend;

    /// In-memory opener standing in for the host byte-stream boundary.
    struct MapOpener {
        assets: HashMap<String, Vec<u8>>,
    }

    impl AssetOpener for MapOpener {
        fn open(&self, uri: &str) -> Result<Vec<u8>> {
            self.assets
                .get(uri)
                .cloned()
                .ok_or_else(|| StoreError::InvalidPath(uri.to_string()))
        }
    }

    fn test_tree(assets: &[(&str, &[u8])]) -> (tempfile::TempDir, Config, RecordTree) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.records_path = dir.path().join("Records");
        config.data_path = dir.path().join("Data");
        config.variant_path = dir.path().join("Variants");

        let backend = Arc::new(FileTreeBackend::new(&config, None));
        backend.roots().seed_default_folders(true).unwrap();

        let opener = Arc::new(MapOpener {
            assets: assets
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        });
        let index = Arc::new(SearchIndex::new(&config));
        let variants = Arc::new(VariantCache::new(&config));

        let tree = RecordTree::new(
            &config,
            backend,
            opener,
            Some(index),
            Some(variants),
        );
        (dir, config, tree)
    }

    #[test]
    fn add_item_persists_payload_and_record() {
        let (_dir, config, tree) =
            test_tree(&[("host://object.json", b"{\"mesh\":1}" as &[u8])]);

        let mut node = tree.open("Inventory/Models");
        assert_eq!(node.state, LoadState::Loaded);

        let record = tree
            .add_item(
                &mut node,
                "Cool Chair",
                "host://object.json",
                None,
                &["furniture".to_string()],
            )
            .unwrap();

        // Item lives in its own collision-proof folder.
        assert!(record.path.starts_with("Inventory/Models/Cool Chair_"));
        assert!(record.tags.contains("furniture"));
        assert_eq!(node.records.len(), 1);

        // Payload landed under the data root at the mirrored path.
        let relative = paths::lstore_relative(record.asset_uri.as_deref().unwrap()).unwrap();
        assert!(config.data_path.join(&relative).is_file());
    }

    #[test]
    fn add_item_stores_thumbnail_when_variants_enabled() {
        let (_dir, config, tree) = test_tree(&[
            ("host://object.json", b"{}" as &[u8]),
            ("host://thumb.png", b"png-bytes" as &[u8]),
        ]);

        let mut node = tree.open("Inventory/Models");
        let record = tree
            .add_item(
                &mut node,
                "Chair",
                "host://object.json",
                Some("host://thumb.png"),
                &[],
            )
            .unwrap();

        let thumb_uri = record.thumbnail_uri.as_deref().unwrap();
        assert!(thumb_uri.starts_with(paths::LSTORE_PREFIX));
        let relative = paths::lstore_relative(thumb_uri).unwrap();
        assert!(config.data_path.join(relative).is_file());
    }

    #[test]
    fn duplicate_subdirectory_is_an_error() {
        let (_dir, _config, tree) = test_tree(&[]);
        let mut node = tree.open("Inventory");

        tree.add_subdirectory(&mut node, "Props", false).unwrap();
        let duplicate = tree.add_subdirectory(&mut node, "Props", false);
        assert!(matches!(duplicate, Err(StoreError::Validation(_))));
    }

    #[test]
    fn placeholder_subdirectory_has_no_backing_storage() {
        let (_dir, config, tree) = test_tree(&[]);
        let mut node = tree.open("Inventory");

        let child = tree.add_subdirectory(&mut node, "Pending", true).unwrap();
        assert!(child.placeholder);
        assert!(!config.records_path.join("Inventory/Pending").exists());

        // Committing the same name later still works.
        let committed = tree.add_subdirectory(&mut node, "Pending", false).unwrap();
        assert!(!committed.placeholder);
        assert!(config.records_path.join("Inventory/Pending").is_dir());
    }

    #[test]
    fn links_appear_as_pseudo_subdirectories() {
        let (_dir, _config, tree) = test_tree(&[]);
        let mut node = tree.open("Inventory");

        let link = tree
            .add_link(&mut node, "Friends World", "https://example.com/world")
            .unwrap();
        assert!(link.is_link());
        assert!(node.subdirectories.contains(&"Friends World".to_string()));

        // A reloaded node shows the link as a subdirectory, not a record.
        let reloaded = tree.open("Inventory");
        assert!(reloaded.subdirectories.contains(&"Friends World".to_string()));
        assert!(reloaded.records.is_empty());
    }

    #[test]
    fn delete_item_cleans_asset_and_variants() {
        let (_dir, config, tree) =
            test_tree(&[("host://tex.png", b"png-bytes" as &[u8])]);

        let mut node = tree.open("Inventory/Textures");
        let record = tree
            .add_item(&mut node, "Wood", "host://tex.png", None, &[])
            .unwrap();

        let relative = paths::lstore_relative(record.asset_uri.as_deref().unwrap())
            .unwrap();
        let asset_path = config.data_path.join(&relative);
        assert!(asset_path.is_file());

        // Simulate a previously generated variant.
        let variant_dir = config.variant_path.join(&relative);
        std::fs::create_dir_all(&variant_dir).unwrap();
        std::fs::write(variant_dir.join("256"), b"variant").unwrap();

        assert!(tree.delete_item(&mut node, &record));
        assert!(node.records.is_empty());
        assert!(!asset_path.exists());
        assert!(!variant_dir.exists());
        assert!(tree.backend().load_record(&record.record_id).is_none());
    }

    #[test]
    fn delete_item_on_unknown_record_is_a_no_op() {
        let (_dir, _config, tree) = test_tree(&[]);
        let mut node = tree.open("Inventory");
        let record = Record::new("ghost", "object");
        assert!(!tree.delete_item(&mut node, &record));
    }

    #[test]
    fn recursive_subdirectory_delete_is_depth_first_and_scoped() {
        let (_dir, config, tree) = test_tree(&[
            ("host://a.json", b"{}" as &[u8]),
            ("host://b.json", b"{}" as &[u8]),
            ("host://c.json", b"{}" as &[u8]),
        ]);

        let mut root = tree.open("Inventory");
        let mut foo = tree.add_subdirectory(&mut root, "Foo", false).unwrap();
        let mut deep = tree.add_subdirectory(&mut foo, "Deep", false).unwrap();
        let _ = tree.add_item(&mut foo, "inside", "host://a.json", None, &[]);
        let _ = tree.add_item(&mut deep, "nested", "host://b.json", None, &[]);

        // Prefix sibling that must survive.
        let mut foobar = tree.add_subdirectory(&mut root, "FooBar", false).unwrap();
        let survivor = tree
            .add_item(&mut foobar, "sibling", "host://c.json", None, &[])
            .unwrap();

        tree.delete_subdirectory(&mut root, "Foo").unwrap();

        assert!(!config.records_path.join("Inventory/Foo").exists());
        assert!(config.records_path.join("Inventory/FooBar").is_dir());
        assert!(tree.backend().load_record(&survivor.record_id).is_some());
        assert!(!root.subdirectories.contains(&"Foo".to_string()));
    }

    #[test]
    fn public_flag_is_rejected_on_the_local_namespace() {
        let (_dir, _config, tree) = test_tree(&[]);
        let node = tree.open("Inventory");
        assert!(matches!(
            tree.set_public_recursively(&node),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn deleting_a_missing_subdirectory_is_a_validation_error() {
        let (_dir, _config, tree) = test_tree(&[]);
        let mut node = tree.open("Inventory");
        let result = tree.delete_subdirectory(&mut node, "Nope");
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn uri_extension_parsing() {
        assert_eq!(uri_extension("host://a/b/model.GLB"), Some("glb".into()));
        assert_eq!(uri_extension("host://a/b/archive.json?x=1"), Some("json".into()));
        assert_eq!(uri_extension("host://a/b/no-extension"), None);
        assert_eq!(uri_extension("host://a/b/weird.superlongext"), None);
    }
}
