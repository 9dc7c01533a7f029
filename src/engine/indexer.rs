// FILE: src/engine/indexer.rs
//! In-memory search index over all local records.
//!
//! A denormalized projection (name, path, tags, optionally raw content)
//! keyed by record identifier. Never authoritative: it is rebuilt by a
//! full walk of the record tree at any time, and queries re-fetch
//! canonical records from storage before returning them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use walkdir::WalkDir;

use crate::config::Config;
use crate::storage::paths::{StorageRoots, INVENTORY_ROOT};
use crate::storage::Record;

/// Per-record projection held by the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub name: String,
    pub path: String,
    pub tags: HashSet<String>,
    pub content: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

pub struct SearchIndex {
    entries: DashMap<String, IndexEntry>,
    roots: StorageRoots,
    index_tags: bool,
    index_content: bool,
}

impl SearchIndex {
    pub fn new(config: &Config) -> Self {
        Self {
            entries: DashMap::new(),
            roots: StorageRoots::from_config(config),
            index_tags: config.index_tags,
            index_content: config.index_content,
        }
    }

    /// Rebuild from scratch: clear, then walk every record document under
    /// the Inventory root. Idempotent and total — no stale entries
    /// survive a rebuild.
    pub fn rebuild(&self) {
        self.entries.clear();

        let root = self.roots.records.join(INVENTORY_ROOT);
        if !root.is_dir() {
            tracing::debug!("[SearchIndex] No record tree at {}", root.display());
            return;
        }

        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!(
                        "[SearchIndex] Error indexing file {}: {}",
                        entry.path().display(),
                        e
                    );
                    continue;
                }
            };

            match serde_json::from_str::<Record>(&content) {
                Ok(record) => self.index_record(&record),
                Err(e) => {
                    tracing::error!(
                        "[SearchIndex] Error parsing {}: {}",
                        entry.path().display(),
                        e
                    );
                }
            }
        }

        tracing::info!("[SearchIndex] Built with {} items", self.entries.len());
    }

    /// Upsert a single record's projection. Called on every save, so a
    /// freshly tagged record is searchable without a rebuild.
    pub fn index_record(&self, record: &Record) {
        if record.record_id.is_empty() {
            return;
        }

        let tags = if self.index_tags {
            record.tags.iter().cloned().collect()
        } else {
            HashSet::new()
        };

        let content = if self.index_content {
            self.load_asset_content(record)
        } else {
            None
        };

        self.entries.insert(
            record.record_id.clone(),
            IndexEntry {
                name: record.name.clone(),
                path: record.path.clone(),
                tags,
                content,
                last_modified: record.last_modification_time,
            },
        );
    }

    pub fn remove_record(&self, record_id: &str) {
        self.entries.remove(record_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (record id, entry) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (String, IndexEntry)> + '_ {
        self.entries
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().clone()))
    }

    fn load_asset_content(&self, record: &Record) -> Option<String> {
        let uri = record.local_asset_uri()?;
        match self.roots.resolve_lstore(uri) {
            Ok(Some(path)) => std::fs::read_to_string(path).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("[SearchIndex] Skipping content for {}: {}", record.record_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileTreeBackend, RecordBackend};

    fn test_setup() -> (tempfile::TempDir, FileTreeBackend, SearchIndex) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.records_path = dir.path().join("Records");
        config.data_path = dir.path().join("Data");
        config.variant_path = dir.path().join("Variants");
        config.index_content = true;
        let backend = FileTreeBackend::new(&config, None);
        backend.roots().seed_default_folders(true).unwrap();
        let index = SearchIndex::new(&config);
        (dir, backend, index)
    }

    #[test]
    fn rebuild_walks_the_record_tree() {
        let (_dir, backend, index) = test_setup();

        let mut a = Record::new("Chair", "object");
        a.path = "Inventory/Models".to_string();
        let mut b = Record::new("World", "world");
        b.path = "Inventory/Worlds".to_string();
        assert!(backend.save_record(&mut a));
        assert!(backend.save_record(&mut b));

        index.rebuild();
        assert_eq!(index.len(), 2);

        // Rebuild is idempotent.
        index.rebuild();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn incremental_add_and_remove() {
        let (_dir, backend, index) = test_setup();

        let mut record = Record::new("Chair", "object");
        record.path = "Inventory/Models".to_string();
        record.tags.insert("furniture".to_string());
        assert!(backend.save_record(&mut record));

        index.index_record(&record);
        assert_eq!(index.len(), 1);
        let (_, entry) = index.iter().next().unwrap();
        assert!(entry.tags.contains("furniture"));

        index.remove_record(&record.record_id);
        assert!(index.is_empty());
    }

    #[test]
    fn content_attached_when_enabled() {
        let (_dir, backend, index) = test_setup();

        let asset = backend.roots().data.join("Inventory/Models/chair.json");
        std::fs::create_dir_all(asset.parent().unwrap()).unwrap();
        std::fs::write(&asset, "{\"mesh\":\"chair-geometry\"}").unwrap();

        let mut record = Record::new("Chair", "object");
        record.path = "Inventory/Models".to_string();
        record.asset_uri = Some("lstore:///Inventory/Models/chair.json".to_string());
        assert!(backend.save_record(&mut record));

        index.index_record(&record);
        let (_, entry) = index.iter().next().unwrap();
        assert!(entry.content.unwrap().contains("chair-geometry"));
    }
}
