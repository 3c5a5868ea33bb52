//! A real, `notify`-backed `FsWatcher`. Shaped after a hot-reload capsule
//! watcher: a `RecommendedWatcher` whose callback forwards raw events into a
//! channel, drained by a background task that re-broadcasts them to the
//! reconciler.
//!
//! `notify` has no native pause/resume, so pause/resume flip a gate flag
//! here instead, and the dispatch task checks it
//! immediately before forwarding each event rather than before receiving
//! it, so a paused watcher drops events instead of queuing them for replay
//! on resume.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agent::traits::FsWatcher;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use shared::error::SyncError;
use shared::types::FsEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const EVENT_CAPACITY: usize = 1024;

pub struct NotifyFsWatcher {
    // Kept alive for the duration of the watcher's lifetime; dropping it
    // stops filesystem monitoring.
    _inner: RecommendedWatcher,
    events: broadcast::Sender<FsEvent>,
    paused: Arc<AtomicBool>,
}

impl NotifyFsWatcher {
    /// Start watching `root` recursively. The returned watcher immediately
    /// begins dispatching events; call `pause`/`resume` to gate delivery.
    pub fn new(root: &Path) -> Result<Self, SyncError> {
        let (raw_tx, mut raw_rx) = tokio::sync::mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let paused = Arc::new(AtomicBool::new(false));

        let mut inner = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = raw_tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| SyncError::StoreFailure(format!("failed to initialize filesystem watcher: {e}")))?;

        inner
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::StoreFailure(format!("failed to watch {}: {e}", root.display())))?;

        let dispatch_paused = Arc::clone(&paused);
        let dispatch_events = events.clone();
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                if dispatch_paused.load(Ordering::SeqCst) {
                    continue;
                }
                for path in event.paths {
                    // a receiver count of zero just means nobody is subscribed yet
                    let _ = dispatch_events.send(FsEvent { path });
                }
            }
        });

        Ok(Self { _inner: inner, events, paused })
    }
}

#[async_trait]
impl FsWatcher for NotifyFsWatcher {
    fn events(&self) -> BoxStream<'static, FsEvent> {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|e| async move { e.ok() })
            .boxed()
    }

    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}
