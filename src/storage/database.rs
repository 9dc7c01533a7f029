// FILE: src/storage/database.rs
//! Embedded relational backend.
//!
//! One guarded SQLite connection per store. Every public operation takes
//! the store lock, runs as a single transaction where it mutates, and
//! converts expected failures into boolean/absent returns at the
//! boundary. Mirror pushes are scheduled on the worker, never awaited.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::config::{Config, SyncMode};
use crate::error::Result;
use crate::mirror::{MirrorHandle, MirrorJob};
use crate::storage::paths::StorageRoots;
use crate::storage::{
    generate_directory_id, generate_record_id, paths, AssetEntry, Record, RecordBackend, SyncState,
};

/// Auxiliary data that does not fit the fixed column set, serialized as
/// an embedded JSON blob in the `json_data` column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ExtraData {
    #[serde(default)]
    asset_manifest: Vec<AssetEntry>,
}

pub struct DatabaseBackend {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    roots: StorageRoots,
    mirror: Option<MirrorHandle>,
    sync_mode: SyncMode,
}

impl DatabaseBackend {
    /// Open (or create) the backing database. Schema validation errors
    /// propagate — fatal at startup.
    pub fn open(config: &Config, mirror: Option<MirrorHandle>) -> Result<Self> {
        let conn = super::connection::open_database(&config.database_path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: config.database_path.clone(),
            roots: StorageRoots::from_config(config),
            mirror,
            sync_mode: config.sync_mode,
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Mirror staleness flag for a record, if tracked.
    pub fn sync_state(&self, record_id: &str) -> Option<SyncState> {
        let conn = self.conn.lock().ok()?;
        conn.query_row(
            "SELECT record_id, needs_sync, last_synced FROM sync_state WHERE record_id = ?1",
            params![record_id],
            |row| {
                Ok(SyncState {
                    record_id: row.get(0)?,
                    needs_sync: row.get::<_, i64>(1)? != 0,
                    last_synced: parse_time(row.get::<_, Option<String>>(2)?),
                })
            },
        )
        .ok()
    }

    fn try_save(&self, record: &mut Record) -> Result<()> {
        if record.record_id.is_empty() {
            record.record_id = generate_record_id();
        }
        record.path = paths::normalize_path(&record.path);

        let now = Utc::now();
        if record.creation_time.is_none() {
            record.creation_time = Some(now);
        }
        if record.last_modification_time.is_none() {
            record.last_modification_time = Some(now);
        }

        let extra = ExtraData {
            asset_manifest: record.asset_manifest.clone(),
        };
        let json_data = serde_json::to_string(&extra)?;

        let mut conn = self
            .conn
            .lock()
            .map_err(|_| crate::error::StoreError::State("Poisoned lock".into()))?;
        let tx = conn.transaction()?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM records WHERE record_id = ?1",
            params![record.record_id],
            |row| row.get(0),
        )?;

        if exists > 0 {
            tx.execute(
                "UPDATE records SET
                     owner_id = ?2, path = ?3, name = ?4, description = ?5,
                     record_type = ?6, asset_uri = ?7, thumbnail_uri = ?8,
                     is_public = ?9, is_for_patrons = ?10, is_listed = ?11,
                     last_modified_time = ?12, first_publish_time = ?13,
                     visits = ?14, rating = ?15, random_order = ?16, json_data = ?17
                 WHERE record_id = ?1",
                params![
                    record.record_id,
                    record.owner_id,
                    record.path,
                    record.name,
                    record.description,
                    record.record_type,
                    record.asset_uri,
                    record.thumbnail_uri,
                    record.is_public as i64,
                    record.is_for_patrons as i64,
                    record.is_listed as i64,
                    format_time(record.last_modification_time),
                    format_opt_time(record.first_publish_time),
                    record.visits,
                    record.rating,
                    record.random_order,
                    json_data,
                ],
            )?;

            tx.execute(
                "DELETE FROM tags WHERE record_id = ?1",
                params![record.record_id],
            )?;
        } else {
            tx.execute(
                "INSERT INTO records (
                     record_id, owner_id, path, name, description, record_type,
                     asset_uri, thumbnail_uri, is_public, is_for_patrons, is_listed,
                     creation_time, last_modified_time, first_publish_time,
                     visits, rating, random_order, json_data
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    record.record_id,
                    record.owner_id,
                    record.path,
                    record.name,
                    record.description,
                    record.record_type,
                    record.asset_uri,
                    record.thumbnail_uri,
                    record.is_public as i64,
                    record.is_for_patrons as i64,
                    record.is_listed as i64,
                    format_time(record.creation_time),
                    format_time(record.last_modification_time),
                    format_opt_time(record.first_publish_time),
                    record.visits,
                    record.rating,
                    record.random_order,
                    json_data,
                ],
            )?;
        }

        for tag in &record.tags {
            tx.execute(
                "INSERT INTO tags (record_id, tag) VALUES (?1, ?2)",
                params![record.record_id, tag],
            )?;
        }

        // Every local write marks the mirror stale.
        tx.execute(
            "INSERT OR REPLACE INTO sync_state (record_id, needs_sync, last_synced)
             VALUES (?1, 1, NULL)",
            params![record.record_id],
        )?;

        tx.commit()?;
        drop(conn);

        self.schedule_record_push(record);
        Ok(())
    }

    fn try_delete(&self, record_id: &str) -> Result<bool> {
        // Grab asset info before the row disappears, for local and remote
        // cleanup.
        let doomed = self.load_record(record_id);

        let mut conn = self
            .conn
            .lock()
            .map_err(|_| crate::error::StoreError::State("Poisoned lock".into()))?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM tags WHERE record_id = ?1", params![record_id])?;
        tx.execute(
            "DELETE FROM sync_state WHERE record_id = ?1",
            params![record_id],
        )?;
        let rows = tx.execute(
            "DELETE FROM records WHERE record_id = ?1",
            params![record_id],
        )?;

        tx.commit()?;
        drop(conn);

        if rows > 0 {
            self.schedule_database_push();
            if let Some(record) = doomed {
                // Owned asset and thumbnail go best-effort; the row
                // deletion above is the authoritative part.
                for uri in [record.asset_uri.as_deref(), record.thumbnail_uri.as_deref()]
                    .into_iter()
                    .flatten()
                {
                    match self.roots.resolve_lstore(uri) {
                        Ok(Some(path)) => {
                            if let Err(e) = std::fs::remove_file(&path) {
                                tracing::warn!(
                                    "[RecordStore] Failed to delete asset {}: {}",
                                    path.display(),
                                    e
                                );
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("[RecordStore] Skipping asset cleanup: {}", e),
                    }
                }

                if let Some(uri) = record.local_asset_uri() {
                    let remote = remote_asset_path(&record.record_id, uri);
                    self.schedule(MirrorJob::DeleteRemote { remote });
                }
            }
        }

        Ok(rows > 0)
    }

    fn load_with_conn(conn: &Connection, record_id: &str) -> Result<Option<Record>> {
        let result = conn.query_row(
            "SELECT record_id, owner_id, path, name, description, record_type,
                    asset_uri, thumbnail_uri, is_public, is_for_patrons, is_listed,
                    creation_time, last_modified_time, first_publish_time,
                    visits, rating, random_order, json_data
             FROM records WHERE record_id = ?1",
            params![record_id],
            |row| {
                Ok((
                    Record {
                        record_id: row.get(0)?,
                        owner_id: row.get(1)?,
                        path: row.get(2)?,
                        name: row.get(3)?,
                        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        record_type: row.get(5)?,
                        asset_uri: row.get(6)?,
                        thumbnail_uri: row.get(7)?,
                        is_public: row.get::<_, i64>(8)? != 0,
                        is_for_patrons: row.get::<_, i64>(9)? != 0,
                        is_listed: row.get::<_, i64>(10)? != 0,
                        creation_time: parse_time(row.get::<_, Option<String>>(11)?),
                        last_modification_time: parse_time(row.get::<_, Option<String>>(12)?),
                        first_publish_time: parse_time(row.get::<_, Option<String>>(13)?),
                        visits: row.get::<_, Option<i64>>(14)?.unwrap_or(0),
                        rating: row.get::<_, Option<f64>>(15)?.unwrap_or(0.0),
                        random_order: row.get::<_, Option<i64>>(16)?.unwrap_or(0),
                        tags: Default::default(),
                        asset_manifest: Vec::new(),
                    },
                    row.get::<_, Option<String>>(17)?,
                ))
            },
        );

        let (mut record, json_data) = match result {
            Ok(found) => found,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Some(json_data) = json_data {
            match serde_json::from_str::<ExtraData>(&json_data) {
                Ok(extra) => record.asset_manifest = extra.asset_manifest,
                Err(e) => {
                    tracing::warn!("[RecordStore] Bad json_data for {}: {}", record.record_id, e)
                }
            }
        }

        let mut stmt = conn.prepare("SELECT tag FROM tags WHERE record_id = ?1")?;
        let tags = stmt.query_map(params![record_id], |row| row.get::<_, String>(0))?;
        for tag in tags {
            record.tags.insert(tag?);
        }

        Ok(Some(record))
    }

    fn load_many(conn: &Connection, record_ids: &[String]) -> Vec<Record> {
        let mut records = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            match Self::load_with_conn(conn, record_id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::error!("[RecordStore] Error loading {}: {}", record_id, e),
            }
        }
        records
    }

    fn schedule_record_push(&self, record: &Record) {
        self.schedule_database_push();

        if let Some(uri) = record.local_asset_uri() {
            match self.roots.resolve_lstore(uri) {
                Ok(Some(local)) => {
                    let remote = remote_asset_path(&record.record_id, uri);
                    self.schedule(MirrorJob::PushFile { local, remote });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("[RecordStore] Skipping asset push: {}", e),
            }
        }
    }

    fn schedule_database_push(&self) {
        self.schedule(MirrorJob::PushDatabase);
    }

    /// Fire-and-forget enqueue; the mutation's own result never waits on
    /// the mirror.
    fn schedule(&self, job: MirrorJob) {
        if self.sync_mode != SyncMode::ImmediatePerChange {
            return;
        }
        if let Some(mirror) = &self.mirror {
            drop(mirror.enqueue(job));
        }
    }
}

impl RecordBackend for DatabaseBackend {
    fn save_record(&self, record: &mut Record) -> bool {
        match self.try_save(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[RecordStore] Error saving record {}: {}", record.record_id, e);
                false
            }
        }
    }

    fn load_record(&self, record_id: &str) -> Option<Record> {
        if record_id.is_empty() {
            return None;
        }
        let conn = self.conn.lock().ok()?;
        match Self::load_with_conn(&conn, record_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("[RecordStore] Error loading record {}: {}", record_id, e);
                None
            }
        }
    }

    fn delete_record(&self, record_id: &str) -> bool {
        if record_id.is_empty() {
            return false;
        }
        match self.try_delete(record_id) {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!("[RecordStore] Error deleting record {}: {}", record_id, e);
                false
            }
        }
    }

    fn records_in_directory(&self, owner_id: &str, path: &str) -> Vec<Record> {
        let path = paths::normalize_path(path);
        let Ok(conn) = self.conn.lock() else {
            return Vec::new();
        };

        let ids = (|| -> Result<Vec<String>> {
            let mut stmt =
                conn.prepare("SELECT record_id FROM records WHERE owner_id = ?1 AND path = ?2")?;
            let rows = stmt.query_map(params![owner_id, path], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })();

        match ids {
            Ok(ids) => Self::load_many(&conn, &ids),
            Err(e) => {
                tracing::error!("[RecordStore] Error listing {}: {}", path, e);
                Vec::new()
            }
        }
    }

    fn subdirectories(&self, owner_id: &str, path: &str) -> Vec<String> {
        let path = paths::normalize_path(path);
        let Ok(conn) = self.conn.lock() else {
            return Vec::new();
        };

        let result = (|| -> Result<Vec<String>> {
            let mut names = Vec::new();
            let mut seen = HashSet::new();

            // Immediate child segments implied by record paths.
            let mut stmt = conn.prepare(
                "SELECT DISTINCT substr(path, length(?2) + 2) AS subdir
                 FROM records
                 WHERE owner_id = ?1
                   AND path LIKE ?2 || '/%'
                   AND instr(substr(path, length(?2) + 2), '/') = 0",
            )?;
            let rows = stmt.query_map(params![owner_id, path], |row| row.get::<_, String>(0))?;
            for row in rows {
                let name = row?;
                if !name.is_empty() && seen.insert(name.clone()) {
                    names.push(name);
                }
            }

            // Explicit rows cover empty directories.
            let mut stmt = conn
                .prepare("SELECT name FROM directories WHERE owner_id = ?1 AND path = ?2")?;
            let rows = stmt.query_map(params![owner_id, path], |row| row.get::<_, String>(0))?;
            for row in rows {
                let name = row?;
                if !name.is_empty() && seen.insert(name.clone()) {
                    names.push(name);
                }
            }

            Ok(names)
        })();

        match result {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("[RecordStore] Error listing subdirectories of {}: {}", path, e);
                Vec::new()
            }
        }
    }

    fn create_directory(&self, owner_id: &str, path: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let path = paths::normalize_path(path);

        let result = (|| -> Result<()> {
            let conn = self
                .conn
                .lock()
                .map_err(|_| crate::error::StoreError::State("Poisoned lock".into()))?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO directories (dir_id, owner_id, path, name, creation_time, last_modified_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![generate_directory_id(), owner_id, path, name, now],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.schedule_database_push();
                true
            }
            Err(e) => {
                tracing::error!("[RecordStore] Error creating directory {}/{}: {}", path, name, e);
                false
            }
        }
    }

    fn delete_directory(&self, owner_id: &str, path: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let path = paths::normalize_path(path);
        let full_path = format!("{}/{}", path, name);

        let result = (|| -> Result<()> {
            let mut conn = self
                .conn
                .lock()
                .map_err(|_| crate::error::StoreError::State("Poisoned lock".into()))?;
            let tx = conn.transaction()?;

            // Everything under the prefix, and nothing outside it:
            // exact match or a '/'-delimited descendant. `FooBar` never
            // matches `Foo/%`.
            let record_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT record_id FROM records
                     WHERE owner_id = ?1 AND (path = ?2 OR path LIKE ?2 || '/%')",
                )?;
                let rows = stmt.query_map(params![owner_id, full_path], |row| row.get(0))?;
                let mut ids = Vec::new();
                for row in rows {
                    ids.push(row?);
                }
                ids
            };

            for record_id in &record_ids {
                tx.execute("DELETE FROM tags WHERE record_id = ?1", params![record_id])?;
                tx.execute(
                    "DELETE FROM sync_state WHERE record_id = ?1",
                    params![record_id],
                )?;
            }

            tx.execute(
                "DELETE FROM records
                 WHERE owner_id = ?1 AND (path = ?2 OR path LIKE ?2 || '/%')",
                params![owner_id, full_path],
            )?;

            tx.execute(
                "DELETE FROM directories
                 WHERE owner_id = ?1 AND (path = ?2 OR path LIKE ?2 || '/%')",
                params![owner_id, full_path],
            )?;

            tx.execute(
                "DELETE FROM directories WHERE owner_id = ?1 AND path = ?2 AND name = ?3",
                params![owner_id, path, name],
            )?;

            tx.commit()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.schedule_database_push();
                true
            }
            Err(e) => {
                tracing::error!("[RecordStore] Error deleting directory {}: {}", full_path, e);
                false
            }
        }
    }

    fn search_records(&self, owner_id: &str, text: &str, case_sensitive: bool) -> Vec<Record> {
        if text.is_empty() {
            return Vec::new();
        }
        let Ok(conn) = self.conn.lock() else {
            return Vec::new();
        };

        let needle = if case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        };

        let result = (|| -> Result<Vec<String>> {
            let mut ids = Vec::new();
            let mut seen = HashSet::new();

            // instr() is an ordinal substring check; lower() both sides
            // for the case-folded variant.
            let name_sql = if case_sensitive {
                "SELECT DISTINCT record_id FROM records
                 WHERE owner_id = ?1 AND (instr(name, ?2) > 0 OR instr(description, ?2) > 0)"
            } else {
                "SELECT DISTINCT record_id FROM records
                 WHERE owner_id = ?1
                   AND (instr(lower(name), ?2) > 0 OR instr(lower(description), ?2) > 0)"
            };
            let mut stmt = conn.prepare(name_sql)?;
            let rows = stmt.query_map(params![owner_id, needle], |row| row.get::<_, String>(0))?;
            for row in rows {
                let id = row?;
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }

            let tag_sql = if case_sensitive {
                "SELECT DISTINCT t.record_id FROM tags t
                 JOIN records r ON t.record_id = r.record_id
                 WHERE r.owner_id = ?1 AND instr(t.tag, ?2) > 0"
            } else {
                "SELECT DISTINCT t.record_id FROM tags t
                 JOIN records r ON t.record_id = r.record_id
                 WHERE r.owner_id = ?1 AND instr(lower(t.tag), ?2) > 0"
            };
            let mut stmt = conn.prepare(tag_sql)?;
            let rows = stmt.query_map(params![owner_id, needle], |row| row.get::<_, String>(0))?;
            for row in rows {
                let id = row?;
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }

            Ok(ids)
        })();

        match result {
            Ok(ids) => Self::load_many(&conn, &ids),
            Err(e) => {
                tracing::error!("[RecordStore] Error searching records: {}", e);
                Vec::new()
            }
        }
    }

    fn all_records(&self, owner_id: &str) -> Vec<Record> {
        let Ok(conn) = self.conn.lock() else {
            return Vec::new();
        };

        let ids = (|| -> Result<Vec<String>> {
            let mut stmt = conn.prepare("SELECT record_id FROM records WHERE owner_id = ?1")?;
            let rows = stmt.query_map(params![owner_id], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })();

        match ids {
            Ok(ids) => Self::load_many(&conn, &ids),
            Err(e) => {
                tracing::error!("[RecordStore] Error scanning records: {}", e);
                Vec::new()
            }
        }
    }
}

/// Remote location for a record's owned asset, keyed by record id so a
/// rename never strands the remote copy.
fn remote_asset_path(record_id: &str, asset_uri: &str) -> String {
    let extension = std::path::Path::new(asset_uri)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    format!("assets/{}{}", record_id, extension)
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.unwrap_or_else(Utc::now).to_rfc3339()
}

fn format_opt_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339())
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LOCAL_OWNER;

    fn test_backend() -> (tempfile::TempDir, DatabaseBackend) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database_path = dir.path().join("store.db");
        config.records_path = dir.path().join("Records");
        config.data_path = dir.path().join("Data");
        config.variant_path = dir.path().join("Variants");
        let backend = DatabaseBackend::open(&config, None).unwrap();
        (dir, backend)
    }

    fn sample_record(name: &str, path: &str) -> Record {
        let mut record = Record::new(name, "object");
        record.path = path.to_string();
        record.description = "a test record".to_string();
        record.tags.insert("furniture".to_string());
        record.tags.insert("blue".to_string());
        record.visits = 7;
        record.rating = 4.5;
        record.asset_manifest.push(AssetEntry {
            hash: "abc123".to_string(),
            bytes: 42,
        });
        record
    }

    #[test]
    fn save_load_round_trip() {
        let (_dir, backend) = test_backend();
        let mut record = sample_record("Cool Chair", "Inventory/Models");

        assert!(backend.save_record(&mut record));
        assert!(record.record_id.starts_with("CST-"));
        assert!(record.creation_time.is_some());

        let loaded = backend.load_record(&record.record_id).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn save_marks_sync_state_dirty() {
        let (_dir, backend) = test_backend();
        let mut record = sample_record("Chair", "Inventory/Models");
        assert!(backend.save_record(&mut record));

        let state = backend.sync_state(&record.record_id).unwrap();
        assert!(state.needs_sync);
        assert!(state.last_synced.is_none());
    }

    #[test]
    fn update_replaces_tags_entirely() {
        let (_dir, backend) = test_backend();
        let mut record = sample_record("Chair", "Inventory/Models");
        assert!(backend.save_record(&mut record));

        record.tags.clear();
        record.tags.insert("red".to_string());
        assert!(backend.save_record(&mut record));

        let loaded = backend.load_record(&record.record_id).unwrap();
        assert_eq!(loaded.tags.len(), 1);
        assert!(loaded.tags.contains("red"));
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, backend) = test_backend();
        let mut record = sample_record("Chair", "Inventory/Models");
        assert!(backend.save_record(&mut record));

        assert!(!backend.delete_record("CST-does-not-exist"));
        assert!(backend.delete_record(&record.record_id));
        assert!(!backend.delete_record(&record.record_id));
        assert!(backend.load_record(&record.record_id).is_none());
        assert!(backend.sync_state(&record.record_id).is_none());
    }

    #[test]
    fn directory_listing_is_exact_path() {
        let (_dir, backend) = test_backend();
        let mut a = sample_record("A", "Inventory/Models");
        let mut b = sample_record("B", "Inventory/Models/Sub");
        assert!(backend.save_record(&mut a));
        assert!(backend.save_record(&mut b));

        let records = backend.records_in_directory(LOCAL_OWNER, "Inventory/Models");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "A");

        let subdirs = backend.subdirectories(LOCAL_OWNER, "Inventory/Models");
        assert_eq!(subdirs, vec!["Sub".to_string()]);
    }

    #[test]
    fn explicit_directories_support_empty_dirs() {
        let (_dir, backend) = test_backend();
        assert!(backend.create_directory(LOCAL_OWNER, "Inventory", "Empty"));

        let subdirs = backend.subdirectories(LOCAL_OWNER, "Inventory");
        assert!(subdirs.contains(&"Empty".to_string()));
    }

    #[test]
    fn recursive_delete_spares_prefix_siblings() {
        let (_dir, backend) = test_backend();
        let mut inside = sample_record("inside", "Inventory/Foo");
        let mut nested = sample_record("nested", "Inventory/Foo/Deep");
        let mut sibling = sample_record("sibling", "Inventory/FooBar");
        assert!(backend.save_record(&mut inside));
        assert!(backend.save_record(&mut nested));
        assert!(backend.save_record(&mut sibling));
        assert!(backend.create_directory(LOCAL_OWNER, "Inventory/Foo", "Deep"));

        assert!(backend.delete_directory(LOCAL_OWNER, "Inventory", "Foo"));

        assert!(backend.load_record(&inside.record_id).is_none());
        assert!(backend.load_record(&nested.record_id).is_none());
        assert!(backend.load_record(&sibling.record_id).is_some());
        assert!(backend
            .subdirectories(LOCAL_OWNER, "Inventory/Foo")
            .is_empty());
    }

    #[test]
    fn search_matches_name_description_and_tags() {
        let (_dir, backend) = test_backend();
        let mut chair = sample_record("Cool Chair", "Inventory/Models");
        let mut lamp = sample_record("Lamp", "Inventory/Models");
        lamp.tags.clear();
        lamp.tags.insert("lighting".to_string());
        lamp.description = "warm glow".to_string();
        assert!(backend.save_record(&mut chair));
        assert!(backend.save_record(&mut lamp));

        // name
        let results = backend.search_records(LOCAL_OWNER, "chair", false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, chair.record_id);

        // case sensitivity
        assert!(backend.search_records(LOCAL_OWNER, "CHAIR", true).is_empty());

        // tag
        let results = backend.search_records(LOCAL_OWNER, "furniture", false);
        assert_eq!(results.len(), 1);

        // description
        let results = backend.search_records(LOCAL_OWNER, "glow", false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, lamp.record_id);

        // de-duplicated when name and tag both match
        let results = backend.search_records(LOCAL_OWNER, "l", false);
        let ids: Vec<_> = results.iter().map(|r| &r.record_id).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
    }
}
