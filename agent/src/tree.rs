//! Node hashing and the content key.
//!
//! The distilled spec leaves the exact hash function open; this crate fixes
//! it to BLAKE3 over a canonical, length-prefixed encoding of a node's
//! fields, the same style the reference agent uses to hash its own
//! serialized tree blobs rather than trusting a derived `Hash` impl whose
//! memory layout is not a stable contract.

use std::collections::{HashMap, HashSet, VecDeque};

use shared::error::SyncError;
use shared::types::{BlobId, NodeHash, NodeKind, Tree};

use crate::deadline::with_deadline;
use crate::traits::TreeStore;

/// Hash raw file bytes into a content-addressed blob id.
pub fn hash_blob(bytes: &[u8]) -> BlobId {
    *blake3::hash(bytes).as_bytes()
}

/// Hash a directory node from its already-hashed, name-sorted children.
pub fn hash_directory_node(relative_path: &str, mtime_ms: i64, children: &[NodeHash]) -> NodeHash {
    let mut hasher = blake3::Hasher::new();
    write_field(&mut hasher, &[NodeKind::Directory as u8]);
    write_field(&mut hasher, relative_path.as_bytes());
    write_field(&mut hasher, &mtime_ms.to_le_bytes());
    write_field(&mut hasher, &(children.len() as u64).to_le_bytes());
    for child in children {
        write_field(&mut hasher, child);
    }
    *hasher.finalize().as_bytes()
}

/// Hash a file node from its path, mtime, and the blob it points to.
pub fn hash_file_node(relative_path: &str, mtime_ms: i64, blob_id: &BlobId, size: u64) -> NodeHash {
    let mut hasher = blake3::Hasher::new();
    write_field(&mut hasher, &[NodeKind::File as u8]);
    write_field(&mut hasher, relative_path.as_bytes());
    write_field(&mut hasher, &mtime_ms.to_le_bytes());
    write_field(&mut hasher, blob_id);
    write_field(&mut hasher, &size.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Write a length-prefixed field so two fields cannot collide by boundary
/// slippage (e.g. `"ab" + "c"` vs `"a" + "bc"`).
fn write_field(hasher: &mut blake3::Hasher, field: &[u8]) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field);
}

/// Compute the deterministic content key of a tree: files and non-root
/// directories sorted by relative path, ignoring mtime.
///
/// Two trees whose files share paths and blob ids produce the same content
/// key even if their mtimes (and therefore their `root_hash`es) differ. This
/// is the dedup primitive the outbound and inbound reconcilers gate on.
pub fn content_key(tree: &Tree) -> String {
    let mut entries: Vec<(&str, String)> = Vec::with_capacity(tree.nodes.len());

    for node in tree.nodes.values() {
        if node.relative_path == "." {
            // the root directory itself is excluded from the content key
            continue;
        }

        let entry = match node.kind {
            NodeKind::File => format!(
                "{}:{}",
                node.relative_path,
                hex::encode(node.blob_id.expect("file node missing blob_id"))
            ),
            NodeKind::Directory => format!("{}:<dir>", node.relative_path),
        };

        entries.push((node.relative_path.as_str(), entry));
    }

    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(_, entry)| entry)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flatten a tree into the node order `TreeStore::insert_trees` requires:
/// every non-root node first, the root node last.
pub fn nodes_root_last(tree: &Tree) -> Vec<shared::types::TreeNode> {
    let mut nodes: Vec<_> = tree
        .nodes
        .values()
        .filter(|node| node.hash != tree.root_hash)
        .cloned()
        .collect();

    if let Some(root) = tree.root() {
        nodes.push(root.clone());
    }

    nodes
}

/// Recursively retrieve every node reachable from `root_hash`,
/// using a worklist and a seen set so shared subtrees are fetched
/// once. Each single node lookup is bounded by the `db_query` deadline; the
/// overall walk is bounded by the caller's `fetch_tree` deadline.
pub async fn fetch_tree<T: TreeStore + ?Sized>(
    store: &T,
    tree_key: &str,
    root_hash: &NodeHash,
    db_query_ms: u64,
) -> Result<Tree, SyncError> {
    let root_node = with_deadline("db_query", db_query_ms, store.get_by_hash(tree_key, root_hash))
        .await?
        .ok_or_else(|| SyncError::not_found_root(root_hash))?;

    let mut nodes = HashMap::new();
    let mut seen: HashSet<NodeHash> = HashSet::new();
    seen.insert(*root_hash);

    let mut worklist: VecDeque<NodeHash> = VecDeque::new();
    for child in &root_node.children {
        if seen.insert(*child) {
            worklist.push_back(*child);
        }
    }
    nodes.insert(*root_hash, root_node);

    while let Some(hash) = worklist.pop_front() {
        let node = with_deadline("db_query", db_query_ms, store.get_by_hash(tree_key, &hash))
            .await?
            .ok_or_else(|| SyncError::incomplete(&hash))?;

        for child in &node.children {
            if seen.insert(*child) {
                worklist.push_back(*child);
            }
        }

        nodes.insert(hash, node);
    }

    Ok(Tree {
        root_hash: *root_hash,
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{NodeKind, Tree, TreeNode};

    fn file_node(path: &str, mtime_ms: i64, blob_id: BlobId, size: u64) -> TreeNode {
        TreeNode {
            kind: NodeKind::File,
            name: path.rsplit('/').next().unwrap().to_string(),
            relative_path: path.to_string(),
            mtime_ms,
            hash: hash_file_node(path, mtime_ms, &blob_id, size),
            children: Vec::new(),
            blob_id: Some(blob_id),
            size: Some(size),
        }
    }

    #[test]
    fn content_key_ignores_mtime() {
        let blob = hash_blob(b"hello");
        let mut tree_a = Tree::default();
        let node_a = file_node("a.txt", 1000, blob, 5);
        tree_a.nodes.insert(node_a.hash, node_a.clone());

        let mut tree_b = Tree::default();
        let node_b = file_node("a.txt", 2000, blob, 5);
        tree_b.nodes.insert(node_b.hash, node_b.clone());

        assert_ne!(node_a.hash, node_b.hash, "mtime must move the node hash");
        assert_eq!(content_key(&tree_a), content_key(&tree_b));
    }

    #[test]
    fn content_key_differs_on_bytes() {
        let mut tree_a = Tree::default();
        let node_a = file_node("a.txt", 0, hash_blob(b"one"), 3);
        tree_a.nodes.insert(node_a.hash, node_a);

        let mut tree_b = Tree::default();
        let node_b = file_node("a.txt", 0, hash_blob(b"two"), 3);
        tree_b.nodes.insert(node_b.hash, node_b);

        assert_ne!(content_key(&tree_a), content_key(&tree_b));
    }
}
