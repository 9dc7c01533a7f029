// FILE: src/engine/session.rs
//! Per-session search state.
//!
//! Each browsing session (one open browser in the host) gets an explicit
//! context object in this registry, created when the session appears and
//! removed on teardown. The storage/search core never keys state off
//! live host objects.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::Config;
use crate::engine::{SearchScope, SortMethod};

#[derive(Debug, Clone)]
pub struct SearchSession {
    pub id: u64,
    pub text: String,
    pub scope: SearchScope,
    pub sort: SortMethod,
    pub case_sensitive: bool,
}

pub struct SessionRegistry {
    sessions: DashMap<u64, SearchSession>,
    next_id: AtomicU64,
    default_scope: SearchScope,
    default_sort: SortMethod,
    case_sensitive: bool,
}

impl SessionRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            default_scope: config.default_search_scope,
            default_sort: config.default_sort_method,
            case_sensitive: config.case_sensitive,
        }
    }

    /// Open a new session with the configured defaults. Returns its
    /// handle id.
    pub fn create(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(
            id,
            SearchSession {
                id,
                text: String::new(),
                scope: self.default_scope,
                sort: self.default_sort,
                case_sensitive: self.case_sensitive,
            },
        );
        id
    }

    pub fn get(&self, id: u64) -> Option<SearchSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn set_text(&self, id: u64, text: &str) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.text = text.to_string();
        }
    }

    pub fn clear_text(&self, id: u64) {
        self.set_text(id, "");
    }

    /// Cycle the session's scope and return the new value.
    pub fn cycle_scope(&self, id: u64) -> Option<SearchScope> {
        let mut session = self.sessions.get_mut(&id)?;
        session.scope = session.scope.next();
        Some(session.scope)
    }

    /// Cycle the session's sort method and return the new value.
    pub fn cycle_sort(&self, id: u64) -> Option<SortMethod> {
        let mut session = self.sessions.get_mut(&id)?;
        session.sort = session.sort.next();
        Some(session.sort)
    }

    /// Drop a session at teardown.
    pub fn remove(&self, id: u64) {
        self.sessions.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_start_with_configured_defaults() {
        let mut config = Config::default();
        config.case_sensitive = true;
        config.default_search_scope = SearchScope::ItemsOnly;
        let registry = SessionRegistry::new(&config);

        let id = registry.create();
        let session = registry.get(id).unwrap();
        assert!(session.case_sensitive);
        assert_eq!(session.scope, SearchScope::ItemsOnly);
        assert!(session.text.is_empty());
    }

    #[test]
    fn sessions_are_independent() {
        let registry = SessionRegistry::new(&Config::default());
        let a = registry.create();
        let b = registry.create();

        registry.set_text(a, "chair");
        registry.cycle_scope(a);

        assert_eq!(registry.get(a).unwrap().text, "chair");
        assert!(registry.get(b).unwrap().text.is_empty());
        assert_eq!(registry.get(b).unwrap().scope, SearchScope::All);
    }

    #[test]
    fn removal_is_final() {
        let registry = SessionRegistry::new(&Config::default());
        let id = registry.create();
        assert_eq!(registry.len(), 1);

        registry.remove(id);
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
        assert!(registry.cycle_scope(id).is_none());
    }
}
