//! The inbound reconciler: consumes remote root refs, debounces a
//! burst down to the latest one, fetches and diffs the referenced tree
//! against local content, restores only on a real difference, and quiesces
//! the filesystem watcher for the duration of the restore.
//!
//! Mirrors `outbound.rs`'s shape: same debounce-then-callback structure,
//! same deadline wrapping, same catch-and-log steady-state policy, just fed
//! by a bus stream instead of a filesystem watcher stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use shared::{
    config::{RestoreOptions, ScanOptions, Timeouts},
    error::SyncError,
    types::RootHash,
};

use crate::deadline::with_deadline;
use crate::logger::Logger;
use crate::outbound::StopHandle;
use crate::projector::Projector;
use crate::suppressor::BounceSuppressor;
use crate::traits::{BlobStore, FsWatcher, NotificationBus, TreeStore};
use crate::tree;

pub struct InboundReconciler<B, T, N, W> {
    projector: Arc<Projector<B>>,
    tree_store: Arc<T>,
    bus: Arc<N>,
    watcher: Arc<W>,
    suppressor: Arc<BounceSuppressor>,
    logger: Arc<Logger>,
}

impl<B, T, N, W> InboundReconciler<B, T, N, W>
where
    B: BlobStore + 'static,
    T: TreeStore + 'static,
    N: NotificationBus + 'static,
    W: FsWatcher + 'static,
{
    pub fn new(
        projector: Arc<Projector<B>>,
        tree_store: Arc<T>,
        bus: Arc<N>,
        watcher: Arc<W>,
        suppressor: Arc<BounceSuppressor>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            projector,
            tree_store,
            bus,
            watcher,
            suppressor,
            logger,
        }
    }

    /// Subscribe to `tree_key` on the bus and restore every surviving root
    /// ref of a debounced burst into `root_path` until the returned handle
    /// is stopped.
    pub async fn start_consuming(
        self: Arc<Self>,
        root_path: PathBuf,
        tree_key: String,
        restore_options: RestoreOptions,
        scan_options: ScanOptions,
        timeouts: Timeouts,
    ) -> Result<StopHandle, SyncError> {
        let this = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut rows = this.bus.subscribe(&tree_key).await;
            let mut pending: Option<RootHash> = None;
            let mut deadline: Option<tokio::time::Instant> = None;

            loop {
                let sleep = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => futures::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    row = rows.next() => {
                        match row {
                            Some(row) => {
                                // a later root ref supersedes an earlier one of the same burst
                                pending = Some(row.root_hash);
                                deadline = Some(tokio::time::Instant::now() + Duration::from_millis(timeouts.debounce_ms));
                            }
                            None => break,
                        }
                    }
                    _ = sleep, if deadline.is_some() => {
                        deadline = None;
                        if let Some(root) = pending.take() {
                            match this
                                .reconcile_once(&root_path, &tree_key, &root, &restore_options, &scan_options, &timeouts)
                                .await
                            {
                                Ok(()) => {}
                                Err(SyncError::Timeout { label, budget_ms }) => this.logger.timeout(label, budget_ms),
                                Err(err) => this.logger.swallowed(err),
                            }
                        }
                    }
                }
            }
        });

        Ok(StopHandle::new(task))
    }

    /// One coalesced callback: pause the watcher, fetch the incoming tree,
    /// gate on content equality, restore, bookkeep, and resume the watcher
    /// no matter how the body above exits.
    async fn reconcile_once(
        &self,
        root_path: &Path,
        tree_key: &str,
        root: &RootHash,
        restore_options: &RestoreOptions,
        scan_options: &ScanOptions,
        timeouts: &Timeouts,
    ) -> Result<(), SyncError> {
        let mut guard = self.suppressor.lock().await;

        self.watcher.pause().await;
        let result = with_deadline(
            "sync_callback",
            timeouts.sync_callback_ms,
            self.restore_and_bookkeep(root_path, tree_key, root, restore_options, scan_options, timeouts, &mut guard),
        )
        .await;
        self.watcher.resume().await;

        result
    }

    async fn restore_and_bookkeep(
        &self,
        root_path: &Path,
        tree_key: &str,
        root: &RootHash,
        restore_options: &RestoreOptions,
        scan_options: &ScanOptions,
        timeouts: &Timeouts,
        guard: &mut tokio::sync::MutexGuard<'_, crate::suppressor::SuppressorState>,
    ) -> Result<(), SyncError> {
        let incoming_tree = with_deadline(
            "fetch_tree",
            timeouts.fetch_tree_ms,
            tree::fetch_tree(self.tree_store.as_ref(), tree_key, root, timeouts.db_query_ms),
        )
        .await?;

        let current_tree = with_deadline(
            "extract",
            timeouts.extract_ms,
            self.projector.extract(root_path, scan_options),
        )
        .await?;

        if tree::content_key(&current_tree) == tree::content_key(&incoming_tree) {
            // already achieved locally; a clean_target restore here would
            // delete files created locally during the round trip
            return Ok(());
        }

        with_deadline(
            "restore",
            timeouts.restore_ms,
            self.projector.restore(&incoming_tree, root_path, restore_options),
        )
        .await?;

        let restored = with_deadline(
            "extract",
            timeouts.extract_ms,
            self.projector.extract(root_path, scan_options),
        )
        .await?;

        let key = tree::content_key(&restored);
        let nodes = tree::nodes_root_last(&restored);
        let row = with_deadline(
            "fetch_tree",
            timeouts.fetch_tree_ms,
            self.tree_store.insert_trees(tree_key, nodes, true),
        )
        .await?;

        guard.record(row.root_hash, key);

        crate::log!(self.logger, "restored {} into {} for {}", shared::types::hex(root), root_path.display(), tree_key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::OutboundReconciler;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use shared::types::{BlobId, FsEvent, InsertHistoryRow, NodeHash, TreeNode};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::{broadcast, Mutex as TokioMutex};
    use tokio_stream::wrappers::BroadcastStream;

    struct MemBlobStore {
        blobs: StdMutex<HashMap<BlobId, Vec<u8>>>,
    }

    impl MemBlobStore {
        fn new() -> Self {
            Self { blobs: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl BlobStore for MemBlobStore {
        async fn put(&self, bytes: &[u8]) -> Result<BlobId, SyncError> {
            let id = crate::tree::hash_blob(bytes);
            self.blobs.lock().unwrap().insert(id, bytes.to_vec());
            Ok(id)
        }

        async fn get(&self, id: &BlobId) -> Result<Vec<u8>, SyncError> {
            self.blobs
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| SyncError::blob_unavailable("<test>", id))
        }

        async fn exists(&self, id: &BlobId) -> Result<bool, SyncError> {
            Ok(self.blobs.lock().unwrap().contains_key(id))
        }
    }

    #[derive(Default)]
    struct MemTreeStore {
        nodes: StdMutex<HashMap<NodeHash, TreeNode>>,
        next_time_id: StdMutex<u64>,
    }

    #[async_trait]
    impl TreeStore for MemTreeStore {
        async fn insert_trees(
            &self,
            tree_key: &str,
            nodes: Vec<TreeNode>,
            _suppress_notification: bool,
        ) -> Result<InsertHistoryRow, SyncError> {
            let root = nodes.last().ok_or_else(|| SyncError::InvalidInput("empty nodes".into()))?.hash;
            let mut store = self.nodes.lock().unwrap();
            for node in nodes {
                store.insert(node.hash, node);
            }
            drop(store);

            let mut time_id = self.next_time_id.lock().unwrap();
            *time_id += 1;
            Ok(InsertHistoryRow { time_id: *time_id, route: tree_key.to_string(), root_hash: root })
        }

        async fn get_by_hash(&self, _tree_key: &str, hash: &NodeHash) -> Result<Option<TreeNode>, SyncError> {
            Ok(self.nodes.lock().unwrap().get(hash).cloned())
        }
    }

    struct MemBus {
        sender: broadcast::Sender<InsertHistoryRow>,
    }

    impl MemBus {
        fn new() -> Self {
            let (sender, _) = broadcast::channel(256);
            Self { sender }
        }
    }

    #[async_trait]
    impl NotificationBus for MemBus {
        async fn subscribe(&self, _route: &str) -> BoxStream<'static, InsertHistoryRow> {
            BroadcastStream::new(self.sender.subscribe())
                .filter_map(|r| async move { r.ok() })
                .boxed()
        }

        async fn publish(&self, _route: &str, row: InsertHistoryRow) {
            self.sender.send(row).ok();
        }

        async fn publish_with_ack(&self, route: &str, row: InsertHistoryRow) -> Result<(), SyncError> {
            self.publish(route, row).await;
            Ok(())
        }
    }

    struct NoopWatcher;

    #[async_trait]
    impl FsWatcher for NoopWatcher {
        fn events(&self) -> BoxStream<'static, FsEvent> {
            futures::stream::pending().boxed()
        }

        async fn pause(&self) {}
        async fn resume(&self) {}
    }

    #[tokio::test]
    async fn one_shot_a_to_b_restores_bytes() {
        let a_dir = tempfile::tempdir().unwrap();
        let b_dir = tempfile::tempdir().unwrap();
        std::fs::write(a_dir.path().join("hello.txt"), b"Hello from A").unwrap();

        let blobs = Arc::new(MemBlobStore::new());
        let projector = Arc::new(Projector::new(Arc::clone(&blobs)));
        let tree_store = Arc::new(MemTreeStore::default());

        let tree = projector.extract(a_dir.path(), &ScanOptions::default()).await.unwrap();
        let nodes = tree::nodes_root_last(&tree);
        let row = tree_store.insert_trees("sharedTree", nodes, false).await.unwrap();

        let bus = Arc::new(MemBus::new());
        let watcher = Arc::new(NoopWatcher);
        let suppressor = Arc::new(BounceSuppressor::new());
        let logger = Arc::new(Logger::new());

        let reconciler = Arc::new(InboundReconciler::new(
            Arc::clone(&projector),
            Arc::clone(&tree_store),
            Arc::clone(&bus),
            watcher,
            suppressor,
            logger,
        ));

        let timeouts = Timeouts { debounce_ms: 20, ..Default::default() };
        let _handle = reconciler
            .start_consuming(b_dir.path().to_path_buf(), "sharedTree".to_string(), RestoreOptions::default(), ScanOptions::default(), timeouts)
            .await
            .unwrap();

        bus.publish("sharedTree", row).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(std::fs::read(b_dir.path().join("hello.txt")).unwrap(), b"Hello from A");
    }

    #[tokio::test]
    async fn bounce_back_gate_skips_redundant_restore() {
        // B's own outbound publish is echoed back to B by the bus; the
        // incoming tree's content already matches disk (only the mtime
        // differs), so the restore must be skipped entirely. We
        // observe this indirectly: a real restore would push the file's
        // mtime back to the tree's recorded value, so if the mtime we
        // touched *after* building the tree survives, no restore ran.
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"k").unwrap();

        let blobs = Arc::new(MemBlobStore::new());
        let projector = Arc::new(Projector::new(Arc::clone(&blobs)));
        let tree_store = Arc::new(MemTreeStore::default());
        let bus = Arc::new(MemBus::new());
        let watcher = Arc::new(NoopWatcher);
        let suppressor = Arc::new(BounceSuppressor::new());
        let logger = Arc::new(Logger::new());

        let tree = projector.extract(dir.path(), &ScanOptions::default()).await.unwrap();
        let nodes = tree::nodes_root_last(&tree);
        let row = tree_store.insert_trees("sharedTree", nodes, false).await.unwrap();

        let future_time = filetime::FileTime::from_unix_time(filetime::FileTime::now().unix_seconds() + 120, 0);
        filetime::set_file_times(&file, future_time, future_time).unwrap();

        let reconciler = Arc::new(InboundReconciler::new(
            Arc::clone(&projector),
            Arc::clone(&tree_store),
            Arc::clone(&bus),
            watcher,
            suppressor,
            logger,
        ));

        let timeouts = Timeouts { debounce_ms: 20, ..Default::default() };
        let _handle = reconciler
            .start_consuming(dir.path().to_path_buf(), "sharedTree".to_string(), RestoreOptions { clean_target: true }, ScanOptions::default(), timeouts)
            .await
            .unwrap();

        bus.publish("sharedTree", row).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mtime_after = std::fs::metadata(&file).unwrap().modified().unwrap();
        let touched_epoch_ms = future_time.unix_seconds() * 1000;
        let after_epoch_ms = mtime_after.duration_since(std::time::UNIX_EPOCH).unwrap().as_millis() as i64;
        assert_eq!(after_epoch_ms, touched_epoch_ms, "bounce-back gate must skip the restore, leaving mtime untouched");
    }

    /// A `TreeStore` whose `get_by_hash` never resolves, to prove a stalled
    /// collaborator surfaces as a logged `Timeout` without killing the
    /// reconciler.
    struct StallingTreeStore {
        inner: MemTreeStore,
    }

    #[async_trait]
    impl TreeStore for StallingTreeStore {
        async fn insert_trees(
            &self,
            tree_key: &str,
            nodes: Vec<TreeNode>,
            suppress_notification: bool,
        ) -> Result<InsertHistoryRow, SyncError> {
            self.inner.insert_trees(tree_key, nodes, suppress_notification).await
        }

        async fn get_by_hash(&self, _tree_key: &str, _hash: &NodeHash) -> Result<Option<TreeNode>, SyncError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn timeout_is_logged_and_watcher_stays_active() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"k").unwrap();

        let blobs = Arc::new(MemBlobStore::new());
        let projector = Arc::new(Projector::new(Arc::clone(&blobs)));
        let tree_store = Arc::new(StallingTreeStore { inner: MemTreeStore::default() });
        let bus = Arc::new(MemBus::new());
        let watcher = Arc::new(NoopWatcher);
        let suppressor = Arc::new(BounceSuppressor::new());
        let logger = Arc::new(Logger::new());
        let mut log_rx = logger.subscribe();

        let reconciler = Arc::new(InboundReconciler::new(
            Arc::clone(&projector),
            Arc::clone(&tree_store),
            Arc::clone(&bus),
            watcher,
            suppressor,
            logger,
        ));

        let timeouts = Timeouts { debounce_ms: 20, fetch_tree_ms: 50, ..Default::default() };
        let _handle = reconciler
            .start_consuming(dir.path().to_path_buf(), "sharedTree".to_string(), RestoreOptions::default(), ScanOptions::default(), timeouts)
            .await
            .unwrap();

        bus.publish("sharedTree", InsertHistoryRow { time_id: 1, route: "sharedTree".to_string(), root_hash: [9u8; 32] }).await;

        let event = tokio::time::timeout(Duration::from_secs(2), log_rx.recv()).await.unwrap().unwrap();
        match event {
            crate::logger::LogEvent::Timeout { label, budget_ms } => {
                assert_eq!(label, "fetch_tree");
                assert_eq!(budget_ms, 50);
            }
            other => panic!("expected a timeout event, got {other:?}"),
        }

        // the reconciler loop must still be alive after the first timeout: a
        // second ref is picked up and attempted rather than the task having
        // died (the store is still stalling, so this also times out, which
        // is exactly the proof that the event loop kept running).
        bus.publish("sharedTree", InsertHistoryRow { time_id: 2, route: "sharedTree".to_string(), root_hash: [3u8; 32] }).await;
        let second_event = tokio::time::timeout(Duration::from_secs(2), log_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(second_event, crate::logger::LogEvent::Timeout { .. }), "reconciler must keep processing refs after a timeout");

        assert!(dir.path().join("a.txt").exists(), "a failed restore must never remove pre-existing local files");
    }

    #[allow(dead_code)]
    fn assert_outbound_type<B, T, N, W>(_: &OutboundReconciler<B, T, N, W>) {}
}
