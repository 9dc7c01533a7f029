// FILE: src/storage/mod.rs
pub mod connection;
pub mod database;
pub mod file_tree;
pub mod paths;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Common exports
pub use connection::open_database;
pub use database::DatabaseBackend;
pub use file_tree::FileTreeBackend;
pub use paths::{StorageRoots, INVENTORY_ROOT, LSTORE_PREFIX, LVARIANT_PREFIX};

/// Reserved owner namespace for everything this subsystem manages.
pub const LOCAL_OWNER: &str = "L-LocalStorage";

/// Identifier prefixes marking records/directories created by this store.
pub const RECORD_ID_PREFIX: &str = "CST-";
pub const DIRECTORY_ID_PREFIX: &str = "DIR-";

/// Record type assigned to link entries.
pub const LINK_RECORD_TYPE: &str = "link";

/// Descriptor for one sub-asset of a record (the asset manifest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub hash: String,
    pub bytes: i64,
}

/// A single inventory entry: world, model, link, or any other asset type.
///
/// The identifier is immutable once assigned. Saving a record always
/// overwrites every field; there is no partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    pub owner_id: String,
    pub path: String,
    pub name: String,
    pub description: String,
    pub record_type: String,
    pub asset_uri: Option<String>,
    pub thumbnail_uri: Option<String>,
    pub tags: BTreeSet<String>,
    pub is_public: bool,
    pub is_for_patrons: bool,
    pub is_listed: bool,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modification_time: Option<DateTime<Utc>>,
    pub first_publish_time: Option<DateTime<Utc>>,
    pub visits: i64,
    pub rating: f64,
    pub random_order: i64,
    pub asset_manifest: Vec<AssetEntry>,
}

impl Record {
    /// Blank record under the local owner. Callers fill in what they need;
    /// `save_record` assigns the identifier and timestamps.
    pub fn new(name: &str, record_type: &str) -> Self {
        Self {
            record_id: String::new(),
            owner_id: LOCAL_OWNER.to_string(),
            path: INVENTORY_ROOT.to_string(),
            name: name.to_string(),
            description: String::new(),
            record_type: record_type.to_string(),
            asset_uri: None,
            thumbnail_uri: None,
            tags: BTreeSet::new(),
            is_public: false,
            is_for_patrons: false,
            is_listed: false,
            creation_time: None,
            last_modification_time: None,
            first_publish_time: None,
            visits: 0,
            rating: 0.0,
            random_order: 0,
            asset_manifest: Vec::new(),
        }
    }

    /// Record for a stored object with a local asset payload.
    pub fn new_object(
        name: &str,
        path: &str,
        asset_uri: String,
        thumbnail_uri: Option<String>,
    ) -> Self {
        let mut record = Self::new(name, "object");
        record.path = path.to_string();
        record.asset_uri = Some(asset_uri);
        record.thumbnail_uri = thumbnail_uri;
        record
    }

    /// Link record: shows up in the hierarchy as a pseudo-subdirectory
    /// pointing at a target URI.
    pub fn new_link(name: &str, path: &str, target_uri: String) -> Self {
        let mut record = Self::new(name, LINK_RECORD_TYPE);
        record.path = path.to_string();
        record.asset_uri = Some(target_uri);
        record
    }

    pub fn is_link(&self) -> bool {
        self.record_type == LINK_RECORD_TYPE
    }

    /// Does this record own a locally-stored asset?
    pub fn local_asset_uri(&self) -> Option<&str> {
        self.asset_uri
            .as_deref()
            .filter(|uri| uri.starts_with(LSTORE_PREFIX))
    }
}

/// An explicit directory row. Directories are usually implied by record
/// paths; explicit rows exist so empty directories survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dir_id: String,
    pub owner_id: String,
    pub path: String,
    pub name: String,
    pub creation_time: DateTime<Utc>,
    pub last_modification_time: DateTime<Utc>,
}

/// Per-record mirror staleness flag (database backend only).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub record_id: String,
    pub needs_sync: bool,
    pub last_synced: Option<DateTime<Utc>>,
}

pub fn generate_record_id() -> String {
    format!("{}{}", RECORD_ID_PREFIX, uuid::Uuid::new_v4())
}

pub fn generate_directory_id() -> String {
    format!("{}{}", DIRECTORY_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Durable persistence of records and directories. Two interchangeable
/// implementations exist: a file tree of JSON documents and an embedded
/// SQLite database. The contract is identical either way.
///
/// Expected failures (missing records, disk errors mid-operation) are
/// logged inside the backend and surface as `false`/`None`/empty —
/// callers at the dispatch boundary never see an error type.
pub trait RecordBackend: Send + Sync {
    /// Persist a record, assigning an identifier if it has none and
    /// stamping timestamps. Full overwrite, tags included.
    fn save_record(&self, record: &mut Record) -> bool;

    /// Point lookup by identifier. Absent is not an error.
    fn load_record(&self, record_id: &str) -> Option<Record>;

    /// Remove a record and its tags/sync state. Returns false when the
    /// record did not exist.
    fn delete_record(&self, record_id: &str) -> bool;

    /// Fully-loaded records whose path matches exactly.
    fn records_in_directory(&self, owner_id: &str, path: &str) -> Vec<Record>;

    /// Distinct immediate child directory names, derived from record
    /// paths and explicit directory rows, de-duplicated.
    fn subdirectories(&self, owner_id: &str, path: &str) -> Vec<String>;

    /// Create an explicit directory row.
    fn create_directory(&self, owner_id: &str, path: &str, name: &str) -> bool;

    /// Recursively delete a directory: every record and subdirectory
    /// under the path prefix, then the directory itself.
    fn delete_directory(&self, owner_id: &str, path: &str, name: &str) -> bool;

    /// Substring search over name, description, and tags. Results are
    /// de-duplicated by identifier and fully loaded.
    fn search_records(&self, owner_id: &str, text: &str, case_sensitive: bool) -> Vec<Record>;

    /// Every record belonging to the owner. Used by index rebuilds.
    fn all_records(&self, owner_id: &str) -> Vec<Record>;
}

/// Case-folding substring containment shared by both backends.
pub(crate) fn text_matches(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefixes() {
        let record_id = generate_record_id();
        let dir_id = generate_directory_id();
        assert!(record_id.starts_with(RECORD_ID_PREFIX));
        assert!(dir_id.starts_with(DIRECTORY_ID_PREFIX));
        assert_ne!(generate_record_id(), record_id);
    }

    #[test]
    fn link_records_are_links() {
        let link = Record::new_link("portal", "Inventory", "https://example.com/w".into());
        assert!(link.is_link());
        assert!(Record::new("chair", "object").local_asset_uri().is_none());

        let mut object = Record::new("chair", "object");
        object.asset_uri = Some("lstore:///Inventory/chair.json".into());
        assert_eq!(
            object.local_asset_uri(),
            Some("lstore:///Inventory/chair.json")
        );
    }

    #[test]
    fn matching_respects_case_flag() {
        assert!(text_matches("Cool Chair", "chair", false));
        assert!(!text_matches("Cool Chair", "CHAIR", true));
        assert!(text_matches("Cool Chair", "Chair", true));
    }
}
