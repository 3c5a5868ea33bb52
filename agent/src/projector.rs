//! The filesystem projector: directory ↔ immutable tree, blob I/O,
//! and restore with optional pruning.
//!
//! Walks are iterative-recursive the way the reference agent's own
//! directory walk builds a tree bottom-up from a manual queue, except here
//! each directory's subtree is built before the directory node itself is
//! hashed (so the parent's child hash list is always complete), which is
//! naturally expressed as a boxed recursive `async fn`.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use glob::Pattern;
use shared::{
    config::{RestoreOptions, ScanOptions},
    error::SyncError,
    types::{NodeKind, Tree, TreeNode},
};

use crate::traits::BlobStore;
use crate::tree::{hash_blob, hash_directory_node, hash_file_node};

/// Turns a directory into an immutable, content-addressed [`Tree`] and back.
pub struct Projector<B: BlobStore> {
    blobs: Arc<B>,
}

impl<B: BlobStore + 'static> Projector<B> {
    pub fn new(blobs: Arc<B>) -> Self {
        Self { blobs }
    }

    /// Enumerate the relative paths of `root_path` in the same
    /// deterministic, ignore-and-depth-aware order `extract` uses, without
    /// touching the blob store. The cheap read-only half of `extract`.
    pub async fn scan(&self, root_path: &Path, options: &ScanOptions) -> Result<Vec<String>, SyncError> {
        check_root(root_path)?;

        let mut paths = Vec::new();
        scan_dir(root_path, String::from("."), 0, options, &mut paths).await?;
        paths.sort();
        Ok(paths)
    }

    /// Walk `root_path` and build an immutable tree, writing every file's
    /// bytes to the blob store along the way.
    pub async fn extract(&self, root_path: &Path, options: &ScanOptions) -> Result<Tree, SyncError> {
        check_root(root_path)?;

        let mut nodes = std::collections::HashMap::new();
        let root_node = extract_dir(self, root_path.to_path_buf(), ".".to_string(), 0, options, &mut nodes).await?;
        let root_hash = root_node.hash;
        nodes.insert(root_hash, root_node);

        Ok(Tree { root_hash, nodes })
    }

    /// Recreate `tree` under `target_path`.
    pub async fn restore(
        &self,
        tree: &Tree,
        target_path: &Path,
        options: &RestoreOptions,
    ) -> Result<(), SyncError> {
        let root = tree
            .root()
            .ok_or_else(|| SyncError::InvalidInput("tree has no root node".into()))?;
        if root.kind != NodeKind::Directory {
            return Err(SyncError::InvalidInput("tree root is not a directory".into()));
        }

        tokio::fs::create_dir_all(target_path).await?;
        restore_dir(self, tree, root, target_path.to_path_buf()).await?;

        if options.clean_target {
            prune(tree, target_path).await?;
        }

        Ok(())
    }
}

fn check_root(root_path: &Path) -> Result<(), SyncError> {
    if !root_path.exists() {
        return Err(SyncError::NotFound(root_path.display().to_string()));
    }
    if !root_path.is_dir() {
        return Err(SyncError::NotADirectory(root_path.to_path_buf()));
    }
    Ok(())
}

fn should_skip(name: &str, relative_path: &str, is_symlink: bool, options: &ScanOptions) -> bool {
    if is_symlink && !options.follow_symlinks {
        return true;
    }
    let _ = name;
    options
        .ignore
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|pattern| pattern.matches(relative_path))
}

fn within_depth(depth: u32, options: &ScanOptions) -> bool {
    match options.max_depth {
        Some(max) => depth <= max,
        None => true,
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<tokio::fs::DirEntry>, SyncError> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn to_mtime_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent == "." {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn scan_dir<'a>(
    abs_path: &'a Path,
    relative_path: String,
    depth: u32,
    options: &'a ScanOptions,
    out: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let entries = sorted_entries(abs_path).await?;

        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let child_relative = join_relative(&relative_path, &name);
            let file_type = entry.file_type().await?;
            let is_symlink = file_type.is_symlink();

            if should_skip(&name, &child_relative, is_symlink, options) || !within_depth(depth + 1, options) {
                continue;
            }

            if file_type.is_dir() || (is_symlink && options.follow_symlinks && entry.path().is_dir()) {
                out.push(child_relative.clone());
                scan_dir(&entry.path(), child_relative, depth + 1, options, out).await?;
            } else if file_type.is_file() || (is_symlink && options.follow_symlinks) {
                out.push(child_relative);
            }
        }

        Ok(())
    })
}

fn extract_dir<'a, B: BlobStore + 'static>(
    projector: &'a Projector<B>,
    abs_path: PathBuf,
    relative_path: String,
    depth: u32,
    options: &'a ScanOptions,
    nodes: &'a mut std::collections::HashMap<shared::types::NodeHash, TreeNode>,
) -> Pin<Box<dyn Future<Output = Result<TreeNode, SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let metadata = tokio::fs::metadata(&abs_path).await?;
        let mtime_ms = to_mtime_ms(&metadata);
        let entries = sorted_entries(&abs_path).await?;

        let mut children = Vec::new();

        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let child_relative = join_relative(&relative_path, &name);
            let child_path = entry.path();
            let file_type = entry.file_type().await?;
            let is_symlink = file_type.is_symlink();

            if should_skip(&name, &child_relative, is_symlink, options) || !within_depth(depth + 1, options) {
                continue;
            }

            if file_type.is_dir() || (is_symlink && options.follow_symlinks && child_path.is_dir()) {
                let child_node = extract_dir(projector, child_path, child_relative, depth + 1, options, nodes).await?;
                children.push(child_node.hash);
                nodes.insert(child_node.hash, child_node);
            } else if file_type.is_file() || (is_symlink && options.follow_symlinks) {
                let child_metadata = tokio::fs::metadata(&child_path).await?;
                let bytes = tokio::fs::read(&child_path).await?;
                let blob_id = hash_blob(&bytes);
                projector.blobs.put(&bytes).await?;

                let child_mtime_ms = to_mtime_ms(&child_metadata);
                let size = bytes.len() as u64;
                let hash = hash_file_node(&child_relative, child_mtime_ms, &blob_id, size);

                let node = TreeNode {
                    kind: NodeKind::File,
                    name,
                    relative_path: child_relative,
                    mtime_ms: child_mtime_ms,
                    hash,
                    children: Vec::new(),
                    blob_id: Some(blob_id),
                    size: Some(size),
                };
                children.push(node.hash);
                nodes.insert(node.hash, node);
            }
        }

        children.sort();
        let hash = hash_directory_node(&relative_path, mtime_ms, &children);
        let name = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Ok(TreeNode {
            kind: NodeKind::Directory,
            name,
            relative_path,
            mtime_ms,
            hash,
            children,
            blob_id: None,
            size: None,
        })
    })
}

fn restore_dir<'a, B: BlobStore + 'static>(
    projector: &'a Projector<B>,
    tree: &'a Tree,
    dir_node: &'a TreeNode,
    target_dir: PathBuf,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(&target_dir).await?;

        for child_hash in &dir_node.children {
            let child = tree
                .nodes
                .get(child_hash)
                .ok_or_else(|| SyncError::incomplete(child_hash))?;

            let child_path = target_dir.join(&child.name);

            match child.kind {
                NodeKind::Directory => {
                    restore_dir(projector, tree, child, child_path).await?;
                    apply_mtime(&target_dir.join(&child.name), child.mtime_ms);
                }
                NodeKind::File => {
                    let blob_id = child
                        .blob_id
                        .ok_or_else(|| SyncError::InvalidInput(format!("file node {} missing blob_id", child.relative_path)))?;

                    let bytes = projector
                        .blobs
                        .get(&blob_id)
                        .await
                        .map_err(|_| SyncError::blob_unavailable(child.relative_path.clone(), &blob_id))?;

                    tokio::fs::write(&child_path, &bytes).await?;
                    apply_mtime(&child_path, child.mtime_ms);
                }
            }
        }

        Ok(())
    })
}

fn apply_mtime(path: &Path, mtime_ms: i64) {
    let seconds = mtime_ms.div_euclid(1000);
    let nanos = (mtime_ms.rem_euclid(1000) * 1_000_000) as u32;
    let time = filetime::FileTime::from_unix_time(seconds, nanos);
    // best-effort: a file removed between write and here is not our problem
    let _ = filetime::set_file_times(path, time, time);
}

/// Compute the expected-paths set: every directory and every file path in
/// the tree plus all ancestor directories of each file.
fn expected_paths(tree: &Tree) -> HashSet<String> {
    let mut expected = HashSet::new();

    for node in tree.nodes.values() {
        if node.relative_path == "." {
            continue;
        }

        expected.insert(node.relative_path.clone());

        if node.kind == NodeKind::File {
            let mut ancestor = node.relative_path.as_str();
            while let Some((parent, _)) = ancestor.rsplit_once('/') {
                expected.insert(parent.to_string());
                ancestor = parent;
            }
        }
    }

    expected
}

/// Remove every path under `target_path` not present in `tree`'s
/// expected-paths set. Unexpected files are deleted; unexpected
/// directories are deleted recursively.
async fn prune(tree: &Tree, target_path: &Path) -> Result<(), SyncError> {
    let expected = expected_paths(tree);
    prune_dir(target_path, target_path, &expected).await
}

fn prune_dir<'a>(
    target_root: &'a Path,
    dir: &'a Path,
    expected: &'a HashSet<String>,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        let mut children = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            children.push(entry);
        }

        for entry in children {
            let path = entry.path();
            let relative = path
                .strip_prefix(target_root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            let file_type = entry.file_type().await?;

            if expected.contains(&relative) {
                if file_type.is_dir() {
                    prune_dir(target_root, &path, expected).await?;
                }
                continue;
            }

            if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }

        Ok(())
    })
}
