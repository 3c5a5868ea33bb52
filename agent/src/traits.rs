//! Trait shapes for the external collaborators: the blob store, the tree store, the notification bus,
//! and the filesystem watcher. This crate defines interfaces only; the
//! `store` crate supplies minimal in-memory/real implementations.

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::{
    error::SyncError,
    types::{BlobId, FsEvent, InsertHistoryRow, NodeHash, TreeNode},
};

/// Content-addressed, write-once byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<BlobId, SyncError>;
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>, SyncError>;
    async fn exists(&self, id: &BlobId) -> Result<bool, SyncError>;
}

/// An ordered container of tree nodes plus an append-only insert-history log.
///
/// Implementations MUST honor `suppress_notification` for every reactive
/// observer they themselves drive, not only the bus publish call, so a
/// suppressed insert can't re-enter the outbound path through a side
/// channel the store wires up internally.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Insert every node of `nodes`, whose last entry MUST be the root node.
    /// Returns the freshly appended insert-history row (carrying a new
    /// monotonic `time_id`). The insertion order (non-root nodes first, root
    /// last) guarantees any observer that sees the root also sees every
    /// child it references.
    ///
    /// `suppress_notification` marks the row as bookkeeping-only in the
    /// store's own insert-history log; callers that want the row delivered
    /// over a `NotificationBus` do so themselves via `publish`/
    /// `publish_with_ack`, since this trait has no bus handle of its own.
    async fn insert_trees(
        &self,
        tree_key: &str,
        nodes: Vec<TreeNode>,
        suppress_notification: bool,
    ) -> Result<InsertHistoryRow, SyncError>;

    /// Fetch a single node by hash, or `None` if it is not present.
    async fn get_by_hash(&self, tree_key: &str, hash: &NodeHash) -> Result<Option<TreeNode>, SyncError>;
}

/// Delivers insert-history rows between agents, filtered by route.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Subscribe to rows published on `route`. The returned stream is a
    /// single-subscriber view; dropping it unsubscribes.
    async fn subscribe(&self, route: &str) -> BoxStream<'static, InsertHistoryRow>;

    /// Fire-and-forget publish.
    async fn publish(&self, route: &str, row: InsertHistoryRow);

    /// Publish and block until the bus acknowledges remote receipt.
    async fn publish_with_ack(&self, route: &str, row: InsertHistoryRow) -> Result<(), SyncError>;
}

/// A paused watcher is guaranteed to emit no events until `resume()` returns.
#[async_trait]
pub trait FsWatcher: Send + Sync {
    /// Subscribe to every filesystem event under the watched root. The
    /// returned stream yields nothing while the watcher is paused.
    fn events(&self) -> BoxStream<'static, FsEvent>;

    async fn pause(&self);
    async fn resume(&self);
}
