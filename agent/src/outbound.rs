//! The outbound reconciler: watches a directory, debounces bursts of
//! filesystem events into a single coalesced reconcile, and publishes a new
//! root ref only when the directory's content actually changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use shared::{
    config::{ScanOptions, Timeouts},
    error::SyncError,
};

use crate::deadline::with_deadline;
use crate::logger::Logger;
use crate::projector::Projector;
use crate::suppressor::BounceSuppressor;
use crate::traits::{BlobStore, FsWatcher, NotificationBus, TreeStore};
use crate::tree;

/// Cancels the debounce timer and stops watching when dropped or `stop`ped.
pub struct StopHandle {
    task: tokio::task::JoinHandle<()>,
}

impl StopHandle {
    pub(crate) fn new(task: tokio::task::JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

pub struct OutboundReconciler<B, T, N, W> {
    projector: Arc<Projector<B>>,
    tree_store: Arc<T>,
    bus: Arc<N>,
    watcher: Arc<W>,
    suppressor: Arc<BounceSuppressor>,
    logger: Arc<Logger>,
}

impl<B, T, N, W> OutboundReconciler<B, T, N, W>
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

    /// Publish the current state of `root_path` once immediately, then keep
    /// publishing on every debounced burst of filesystem events until the
    /// returned handle is stopped.
    pub async fn start_publishing(
        self: Arc<Self>,
        root_path: PathBuf,
        tree_key: String,
        scan_options: ScanOptions,
        timeouts: Timeouts,
        require_ack: bool,
    ) -> Result<StopHandle, SyncError> {
        self.reconcile_once(&root_path, &tree_key, &scan_options, &timeouts, require_ack)
            .await?;

        let this = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut events = this.watcher.events();
            let mut deadline: Option<tokio::time::Instant> = None;

            loop {
                let sleep = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => futures::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    event = events.next() => {
                        match event {
                            Some(_) => {
                                deadline = Some(tokio::time::Instant::now() + Duration::from_millis(timeouts.debounce_ms));
                            }
                            None => break,
                        }
                    }
                    _ = sleep, if deadline.is_some() => {
                        deadline = None;
                        match this
                            .reconcile_once(&root_path, &tree_key, &scan_options, &timeouts, require_ack)
                            .await
                        {
                            Ok(()) => {}
                            Err(SyncError::Timeout { label, budget_ms }) => this.logger.timeout(label, budget_ms),
                            Err(err) => this.logger.swallowed(err),
                        }
                    }
                }
            }
        });

        Ok(StopHandle { task })
    }

    /// One coalesced callback: extract, gate on content key, insert, gate on
    /// root hash, publish. Holds the suppressor lock for the whole thing so
    /// an inbound restore can never interleave with it.
    async fn reconcile_once(
        &self,
        root_path: &Path,
        tree_key: &str,
        scan_options: &ScanOptions,
        timeouts: &Timeouts,
        require_ack: bool,
    ) -> Result<(), SyncError> {
        let mut guard = self.suppressor.lock().await;

        let current = with_deadline(
            "extract",
            timeouts.extract_ms,
            self.projector.extract(root_path, scan_options),
        )
        .await?;

        let key = tree::content_key(&current);
        if guard.last_sent_content_key() == Some(key.as_str()) {
            return Ok(());
        }

        let nodes = tree::nodes_root_last(&current);
        let row = with_deadline(
            "fetch_tree",
            timeouts.fetch_tree_ms,
            self.tree_store.insert_trees(tree_key, nodes, false),
        )
        .await?;

        if guard.last_sent_root() == Some(&row.root_hash) {
            return Ok(());
        }

        guard.record(row.root_hash, key);

        let root_hash = row.root_hash;

        if require_ack {
            with_deadline(
                "sync_callback",
                timeouts.sync_callback_ms,
                self.bus.publish_with_ack(tree_key, row),
            )
            .await?;
        } else {
            self.bus.publish(tree_key, row).await;
        }

        crate::log!(self.logger, "published {} for {}", shared::types::hex(&root_hash), tree_key);

        Ok(())
    }
}
