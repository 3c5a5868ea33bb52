//! A minimal in-memory `TreeStore`: one node map per tree key, plus an
//! append-only insert-history counter.
//!
//! A suppressed insert must not re-enter the outbound path through any
//! side channel the store itself drives, not only the bus. This adapter
//! wires its own `inserts()` diagnostic feed, meant for a UI or test
//! harness to observe raw store activity, and gates it on
//! `suppress_notification` exactly like the bus publish a caller performs
//! separately, so a bookkeeping insert never re-triggers anything this
//! store drives internally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use agent::traits::TreeStore;
use async_trait::async_trait;
use shared::error::SyncError;
use shared::types::{InsertHistoryRow, NodeHash, TreeNode};
use tokio::sync::broadcast;

/// Not durable, not concurrent-safe beyond a single process: exists so the
/// core crate's properties and scenarios are runnable as ordinary
/// `#[tokio::test]`s.
pub struct InMemoryTreeStore {
    trees: Mutex<HashMap<String, HashMap<NodeHash, TreeNode>>>,
    next_time_id: AtomicU64,
    inserts: broadcast::Sender<InsertHistoryRow>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        let (inserts, _) = broadcast::channel(256);
        Self {
            trees: Mutex::new(HashMap::new()),
            next_time_id: AtomicU64::new(0),
            inserts,
        }
    }

    /// Diagnostic feed of every *non-suppressed* insert, independent of the
    /// `NotificationBus` a caller may publish the same row on. A bookkeeping
    /// insert (`suppress_notification = true`) never appears here.
    pub fn subscribe_inserts(&self) -> broadcast::Receiver<InsertHistoryRow> {
        self.inserts.subscribe()
    }
}

impl Default for InMemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn insert_trees(
        &self,
        tree_key: &str,
        nodes: Vec<TreeNode>,
        suppress_notification: bool,
    ) -> Result<InsertHistoryRow, SyncError> {
        let root = nodes
            .last()
            .ok_or_else(|| SyncError::InvalidInput("insert_trees called with no nodes".into()))?
            .clone();

        {
            let mut trees = self.trees.lock().unwrap();
            let tree = trees.entry(tree_key.to_string()).or_default();
            for node in nodes {
                tree.insert(node.hash, node);
            }
        }

        let time_id = self.next_time_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = InsertHistoryRow {
            time_id,
            route: tree_key.to_string(),
            root_hash: root.hash,
        };

        if !suppress_notification {
            self.inserts.send(row.clone()).ok();
        }

        Ok(row)
    }

    async fn get_by_hash(&self, tree_key: &str, hash: &NodeHash) -> Result<Option<TreeNode>, SyncError> {
        Ok(self
            .trees
            .lock()
            .unwrap()
            .get(tree_key)
            .and_then(|tree| tree.get(hash))
            .cloned())
    }
}
