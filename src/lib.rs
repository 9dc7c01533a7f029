//! Lodestore: local-first inventory record storage
//!
//! Replaces cloud-backed inventory storage with a local store, optionally
//! mirrored to a WebDAV server. Four cooperating parts:
//! - Record Store (two backends: JSON file tree, embedded SQLite)
//! - Directory Tree (path-addressed hierarchy over the store)
//! - Search Index (in-memory substring index, rebuildable at any time)
//! - Mirror (best-effort remote push/pull through a bounded worker)

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod storage;
pub mod variants;

pub use crate::config::{Config, SyncMode};
pub use crate::core::{AssetOpener, FsAssetOpener, LoadState, RecordTree, TreeNode};
pub use crate::engine::{SearchIndex, SearchScope, Searcher, SessionRegistry, SortMethod};
pub use crate::error::{Result, StoreError};
pub use crate::mirror::{spawn_mirror_worker, MirrorClient, MirrorHandle, MirrorJob, MirrorTicket};
pub use crate::storage::{
    DatabaseBackend, FileTreeBackend, Record, RecordBackend, StorageRoots, LOCAL_OWNER,
};
pub use crate::variants::{VariantCache, VariantGenerator};
