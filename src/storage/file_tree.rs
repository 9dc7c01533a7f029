// FILE: src/storage/file_tree.rs
//! File-tree backend: one indented JSON document per record.
//!
//! Records live at `<records_root>/<path>/<sanitized-name>.json`, with
//! owned binary assets at the mirrored location under the data root.
//! Directories are real filesystem directories, so empty ones need no
//! bookkeeping rows.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{Config, SyncMode};
use crate::error::Result;
use crate::mirror::{MirrorHandle, MirrorJob};
use crate::storage::paths::{self, StorageRoots};
use crate::storage::{generate_record_id, text_matches, Record, RecordBackend};

pub struct FileTreeBackend {
    roots: StorageRoots,
    mirror: Option<MirrorHandle>,
    sync_mode: SyncMode,
    store_variants: bool,
}

impl FileTreeBackend {
    pub fn new(config: &Config, mirror: Option<MirrorHandle>) -> Self {
        Self {
            roots: StorageRoots::from_config(config),
            mirror,
            sync_mode: config.sync_mode,
            store_variants: config.store_asset_variants,
        }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    fn record_file(&self, path: &str, name: &str) -> PathBuf {
        self.roots
            .records
            .join(paths::normalize_path(path))
            .join(format!("{}.json", paths::sanitize_file_name(name)))
    }

    /// Locate the document holding a record id, anywhere under the root.
    /// Records are name-addressed on disk, so a point lookup is a walk.
    fn find_record_file(&self, record_id: &str) -> Option<PathBuf> {
        for entry in WalkDir::new(&self.roots.records)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            // Cheap containment check before paying for a full parse.
            if !content.contains(record_id) {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<Record>(&content) {
                if record.record_id == record_id {
                    return Some(entry.path().to_path_buf());
                }
            }
        }
        None
    }

    fn read_record(path: &Path) -> Result<Record> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn try_save(&self, record: &mut Record) -> Result<()> {
        if record.record_id.is_empty() {
            record.record_id = generate_record_id();
        }
        record.path = paths::normalize_path(&record.path);

        let now = chrono::Utc::now();
        if record.creation_time.is_none() {
            record.creation_time = Some(now);
        }
        if record.last_modification_time.is_none() {
            record.last_modification_time = Some(now);
        }

        let target = self.record_file(&record.path, &record.name);

        // A move or rename leaves a stale document behind; drop it first.
        if let Some(previous) = self.find_record_file(&record.record_id) {
            if previous != target {
                if let Err(e) = std::fs::remove_file(&previous) {
                    tracing::warn!(
                        "[RecordStore] Could not remove stale record file {}: {}",
                        previous.display(),
                        e
                    );
                }
                self.schedule_remote_delete(&previous);
            }
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::File::create(&target)?;
        serde_json::to_writer_pretty(file, record)?;

        self.schedule_record_push(record, &target);
        Ok(())
    }

    fn try_delete(&self, record_id: &str) -> Result<bool> {
        let Some(file) = self.find_record_file(record_id) else {
            return Ok(false);
        };

        // Best effort on the owned asset and thumbnail; the record
        // document itself is the authoritative part.
        if let Ok(record) = Self::read_record(&file) {
            self.delete_owned_files(&record);
        }

        std::fs::remove_file(&file)?;
        self.prune_empty_parent(&file);
        self.schedule_remote_delete(&file);
        Ok(true)
    }

    fn delete_owned_files(&self, record: &Record) {
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
                    } else {
                        self.prune_empty_parent(&path);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("[RecordStore] Skipping asset cleanup: {}", e),
            }
        }
    }

    /// Opportunistically remove a now-empty parent directory. Not
    /// required for correctness.
    fn prune_empty_parent(&self, file: &Path) {
        let Some(parent) = file.parent() else {
            return;
        };
        let empty = std::fs::read_dir(parent)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            let _ = std::fs::remove_dir(parent);
        }
    }

    fn remote_record_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.roots.records).ok()?;
        Some(format!(
            "records/{}",
            relative.to_string_lossy().replace('\\', "/")
        ))
    }

    fn schedule_record_push(&self, record: &Record, file: &Path) {
        if let Some(remote) = self.remote_record_path(file) {
            self.schedule(MirrorJob::PushFile {
                local: file.to_path_buf(),
                remote,
            });
        }

        if let Some(uri) = record.local_asset_uri() {
            if let (Ok(Some(local)), Some(relative)) =
                (self.roots.resolve_lstore(uri), paths::lstore_relative(uri))
            {
                self.schedule(MirrorJob::PushFile {
                    local,
                    remote: format!("assets/{}", relative),
                });
            }
        }
    }

    fn schedule_remote_delete(&self, file: &Path) {
        if let Some(remote) = self.remote_record_path(file) {
            self.schedule(MirrorJob::DeleteRemote { remote });
        }
    }

    fn schedule(&self, job: MirrorJob) {
        if self.sync_mode != SyncMode::ImmediatePerChange {
            return;
        }
        if let Some(mirror) = &self.mirror {
            drop(mirror.enqueue(job));
        }
    }

    fn walk_records(&self, owner_id: &str) -> Vec<Record> {
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.roots.records)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            match Self::read_record(entry.path()) {
                Ok(record) if record.owner_id == owner_id => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "[RecordStore] Skipping unreadable record {}: {}",
                        entry.path().display(),
                        e
                    );
                }
            }
        }
        records
    }
}

impl RecordBackend for FileTreeBackend {
    fn save_record(&self, record: &mut Record) -> bool {
        match self.try_save(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[RecordStore] Error saving record {}: {}", record.name, e);
                false
            }
        }
    }

    fn load_record(&self, record_id: &str) -> Option<Record> {
        if record_id.is_empty() {
            return None;
        }
        let file = self.find_record_file(record_id)?;
        match Self::read_record(&file) {
            Ok(record) => Some(record),
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
        let dir = self.roots.records.join(paths::normalize_path(path));
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) if record.owner_id == owner_id => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "[RecordStore] Skipping unreadable record {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
        records
    }

    fn subdirectories(&self, _owner_id: &str, path: &str) -> Vec<String> {
        let dir = self.roots.records.join(paths::normalize_path(path));
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut names = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names
    }

    fn create_directory(&self, _owner_id: &str, path: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let full = format!("{}/{}", paths::normalize_path(path), name);
        match self.roots.ensure_structure(&full, self.store_variants) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("[RecordStore] Error creating directory {}: {}", full, e);
                false
            }
        }
    }

    fn delete_directory(&self, _owner_id: &str, path: &str, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let full = format!("{}/{}", paths::normalize_path(path), name);

        let mut any_error = false;
        for root in [&self.roots.records, &self.roots.data, &self.roots.variants] {
            let target = root.join(&full);
            if target.is_dir() {
                if let Err(e) = std::fs::remove_dir_all(&target) {
                    tracing::error!(
                        "[RecordStore] Error deleting directory {}: {}",
                        target.display(),
                        e
                    );
                    any_error = true;
                }
            }
        }

        if !any_error {
            for prefix in ["records", "assets", "variants"] {
                self.schedule(MirrorJob::DeleteRemote {
                    remote: format!("{}/{}", prefix, full),
                });
            }
        }
        !any_error
    }

    fn search_records(&self, owner_id: &str, text: &str, case_sensitive: bool) -> Vec<Record> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut seen = std::collections::HashSet::new();
        self.walk_records(owner_id)
            .into_iter()
            .filter(|record| {
                text_matches(&record.name, text, case_sensitive)
                    || text_matches(&record.description, text, case_sensitive)
                    || record
                        .tags
                        .iter()
                        .any(|tag| text_matches(tag, text, case_sensitive))
            })
            .filter(|record| seen.insert(record.record_id.clone()))
            .collect()
    }

    fn all_records(&self, owner_id: &str) -> Vec<Record> {
        self.walk_records(owner_id)
    }
}
