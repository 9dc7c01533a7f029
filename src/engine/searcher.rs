// FILE: src/engine/searcher.rs
//! Query side of the search index.
//!
//! Matches name, then tags, then (optionally) raw content, short-
//! circuiting per record. The index only yields identifiers — every hit
//! is re-loaded from authoritative storage so results are never stale
//! projections.

use crate::engine::SearchIndex;
use crate::storage::{text_matches, Record, RecordBackend};

pub struct Searcher;

impl Searcher {
    pub fn search(
        index: &SearchIndex,
        backend: &dyn RecordBackend,
        text: &str,
        case_sensitive: bool,
    ) -> Vec<Record> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Lazily build on first use.
        if index.is_empty() {
            index.rebuild();
        }

        let mut results = Vec::new();
        for (record_id, entry) in index.iter() {
            let mut is_match = text_matches(&entry.name, text, case_sensitive);

            if !is_match {
                is_match = entry
                    .tags
                    .iter()
                    .any(|tag| text_matches(tag, text, case_sensitive));
            }

            if !is_match {
                if let Some(content) = &entry.content {
                    is_match = text_matches(content, text, case_sensitive);
                }
            }

            if !is_match {
                continue;
            }

            // Canonical copy or nothing; a record deleted out from under
            // the index simply drops out of the results.
            match backend.load_record(&record_id) {
                Some(record) => results.push(record),
                None => tracing::debug!("[Searcher] Stale index entry for {}", record_id),
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::SearchIndex;
    use crate::storage::FileTreeBackend;

    fn test_setup() -> (tempfile::TempDir, FileTreeBackend, SearchIndex) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.records_path = dir.path().join("Records");
        config.data_path = dir.path().join("Data");
        config.variant_path = dir.path().join("Variants");
        let backend = FileTreeBackend::new(&config, None);
        backend.roots().seed_default_folders(true).unwrap();
        let index = SearchIndex::new(&config);
        (dir, backend, index)
    }

    fn saved_record(backend: &FileTreeBackend, name: &str, tags: &[&str]) -> Record {
        let mut record = Record::new(name, "object");
        record.path = "Inventory/Models".to_string();
        for tag in tags {
            record.tags.insert(tag.to_string());
        }
        assert!(backend.save_record(&mut record));
        record
    }

    #[test]
    fn results_are_reloaded_from_storage() {
        let (_dir, backend, index) = test_setup();
        let record = saved_record(&backend, "Cool Chair", &["furniture", "blue"]);
        index.index_record(&record);

        let results = Searcher::search(&index, &backend, "chair", false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, record.record_id);
        // Canonical fields survive the round trip, not just the projection.
        assert!(results[0].tags.contains("blue"));
    }

    #[test]
    fn case_sensitivity_flag() {
        let (_dir, backend, index) = test_setup();
        let record = saved_record(&backend, "Cool Chair", &["furniture"]);
        index.index_record(&record);

        assert_eq!(Searcher::search(&index, &backend, "chair", false).len(), 1);
        assert!(Searcher::search(&index, &backend, "CHAIR", true).is_empty());
    }

    #[test]
    fn tag_match_appears_without_rebuild() {
        let (_dir, backend, index) = test_setup();
        let mut record = saved_record(&backend, "Plain Box", &[]);
        index.index_record(&record);

        assert!(Searcher::search(&index, &backend, "ornate", false).is_empty());

        // Tag the record and save again: the incremental index update on
        // save is all it takes for the query to start matching.
        record.tags.insert("ornate".to_string());
        assert!(backend.save_record(&mut record));
        index.index_record(&record);

        let results = Searcher::search(&index, &backend, "ornate", false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_id, record.record_id);
    }

    #[test]
    fn deleted_records_drop_out_of_results() {
        let (_dir, backend, index) = test_setup();
        let record = saved_record(&backend, "Ghost", &[]);
        index.index_record(&record);

        assert!(backend.delete_record(&record.record_id));
        // Index entry still present, but the canonical load fails.
        assert!(Searcher::search(&index, &backend, "ghost", false).is_empty());
    }

    #[test]
    fn lazy_rebuild_on_first_query() {
        let (_dir, backend, index) = test_setup();
        saved_record(&backend, "Lamp", &[]);

        assert!(index.is_empty());
        let results = Searcher::search(&index, &backend, "lamp", false);
        assert_eq!(results.len(), 1);
        assert_eq!(index.len(), 1);
    }
}
