// FILE: src/engine/mod.rs
pub mod indexer;
pub mod searcher;
pub mod session;

pub use indexer::{IndexEntry, SearchIndex};
pub use searcher::Searcher;
pub use session::{SearchSession, SessionRegistry};

use serde::{Deserialize, Serialize};

use crate::storage::Record;

/// What kinds of entries a search should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchScope {
    All,
    FoldersOnly,
    ItemsOnly,
}

impl SearchScope {
    /// Advance to the next scope; used by the overlay's cycle button.
    pub fn next(self) -> Self {
        match self {
            Self::All => Self::FoldersOnly,
            Self::FoldersOnly => Self::ItemsOnly,
            Self::ItemsOnly => Self::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::FoldersOnly => "Folders",
            Self::ItemsOnly => "Items",
        }
    }
}

/// Ordering applied to a visible result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMethod {
    /// Storage order, untouched.
    Default,
    NameAscending,
    NameDescending,
    RecentlyAdded,
    OldestFirst,
}

impl SortMethod {
    pub fn next(self) -> Self {
        match self {
            Self::Default => Self::NameAscending,
            Self::NameAscending => Self::NameDescending,
            Self::NameDescending => Self::RecentlyAdded,
            Self::RecentlyAdded => Self::OldestFirst,
            Self::OldestFirst => Self::Default,
        }
    }
}

/// Sort a result list in place according to the session's sort method.
pub fn sort_records(records: &mut [Record], method: SortMethod) {
    match method {
        SortMethod::Default => {}
        SortMethod::NameAscending => {
            records.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        }
        SortMethod::NameDescending => {
            records.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()));
        }
        SortMethod::RecentlyAdded => {
            records.sort_by(|a, b| b.last_modification_time.cmp(&a.last_modification_time));
        }
        SortMethod::OldestFirst => {
            records.sort_by(|a, b| a.last_modification_time.cmp(&b.last_modification_time));
        }
    }
}

/// Keep only the records a scope allows: link records count as folders,
/// everything else as items.
pub fn filter_by_scope(records: &mut Vec<Record>, scope: SearchScope) {
    match scope {
        SearchScope::All => {}
        SearchScope::FoldersOnly => records.retain(|r| r.is_link()),
        SearchScope::ItemsOnly => records.retain(|r| !r.is_link()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_named(name: &str, modified_secs: i64) -> Record {
        let mut record = Record::new(name, "object");
        record.last_modification_time =
            Some(chrono::Utc.timestamp_opt(modified_secs, 0).unwrap());
        record
    }

    #[test]
    fn scope_and_sort_cycles_wrap_around() {
        let mut scope = SearchScope::All;
        for _ in 0..3 {
            scope = scope.next();
        }
        assert_eq!(scope, SearchScope::All);

        let mut sort = SortMethod::Default;
        for _ in 0..5 {
            sort = sort.next();
        }
        assert_eq!(sort, SortMethod::Default);
    }

    #[test]
    fn sorting_by_name_ignores_case() {
        let mut records = vec![
            record_named("banana", 1),
            record_named("Apple", 2),
            record_named("cherry", 3),
        ];
        sort_records(&mut records, SortMethod::NameAscending);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn sorting_by_recency() {
        let mut records = vec![record_named("old", 10), record_named("new", 100)];
        sort_records(&mut records, SortMethod::RecentlyAdded);
        assert_eq!(records[0].name, "new");
        sort_records(&mut records, SortMethod::OldestFirst);
        assert_eq!(records[0].name, "old");
    }

    #[test]
    fn scope_filters_links_as_folders() {
        let link = Record::new_link("portal", "Inventory", "https://x".into());
        let item = Record::new("chair", "object");

        let mut records = vec![link.clone(), item.clone()];
        filter_by_scope(&mut records, SearchScope::FoldersOnly);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_link());

        let mut records = vec![link, item];
        filter_by_scope(&mut records, SearchScope::ItemsOnly);
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_link());
    }
}
