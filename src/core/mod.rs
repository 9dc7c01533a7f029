// FILE: src/core/mod.rs
pub mod tree;

pub use tree::{AssetOpener, FsAssetOpener, LoadState, RecordTree, TreeNode};
