//! Defines types used across the engine and its store/bus adapters.

use serde::{Deserialize, Serialize};

/// The hash of a tree node, including directory nodes (a directory's `_hash`
/// doubles as its root hash when it is the tree root).
pub type NodeHash = [u8; 32];

/// Alias for `NodeHash` used where a hash specifically names a tree root.
pub type RootHash = NodeHash;

/// The content-addressed id of a blob in the blob store.
pub type BlobId = [u8; 32];

/// A monotonic id assigned to each row appended to the insert-history log.
pub type TimeId = u64;

/// Either a directory or a file node in a content-addressed tree.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub enum NodeKind {
    Directory,
    File,
}

/// One node of an immutable, content-addressed tree.
///
/// `_hash` is a deterministic function of every other field (see
/// `agent::tree::hash_node`) and is kept alongside the node rather than
/// recomputed on every access, the way the reference agent keeps a
/// precomputed `next_sibling` hash alongside a serialized tree blob.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub name: String,
    pub relative_path: String,
    pub mtime_ms: i64,
    pub hash: NodeHash,
    /// Present (and always empty for files) when `kind == Directory`.
    pub children: Vec<NodeHash>,
    /// Present only when `kind == File`.
    pub blob_id: Option<BlobId>,
    /// Present only when `kind == File`.
    pub size: Option<u64>,
}

/// A self-contained collection of nodes plus the hash of its root node.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug, Default)]
pub struct Tree {
    pub root_hash: NodeHash,
    pub nodes: std::collections::HashMap<NodeHash, TreeNode>,
}

impl Tree {
    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.get(&self.root_hash)
    }
}

/// A row appended to the append-only insert-history log whenever a tree is
/// inserted into the tree store. Delivered verbatim by the notification bus.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct InsertHistoryRow {
    pub time_id: TimeId,
    pub route: String,
    pub root_hash: RootHash,
}

/// A single filesystem change observed by a watcher.
#[derive(Clone, Debug)]
pub struct FsEvent {
    pub path: std::path::PathBuf,
}

pub fn hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
