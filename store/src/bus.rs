//! A minimal in-memory `NotificationBus`: one broadcast channel per route,
//! so a publisher's own message is delivered back to itself via local
//! echo. The core relies on the bounce-back suppressor to break the
//! resulting ring, not on any transport-level deduplication this bus might
//! otherwise provide.

use std::collections::HashMap;
use std::sync::Mutex;

use agent::traits::NotificationBus;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use shared::error::SyncError;
use shared::types::InsertHistoryRow;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const ROUTE_CAPACITY: usize = 256;

/// Not durable: routes and their backlog disappear with the process. Good
/// enough to drive end-to-end scenarios between two in-process "agents".
pub struct InMemoryBus {
    routes: Mutex<HashMap<String, broadcast::Sender<InsertHistoryRow>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self { routes: Mutex::new(HashMap::new()) }
    }

    fn sender_for(&self, route: &str) -> broadcast::Sender<InsertHistoryRow> {
        let mut routes = self.routes.lock().unwrap();
        routes
            .entry(route.to_string())
            .or_insert_with(|| broadcast::channel(ROUTE_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBus for InMemoryBus {
    async fn subscribe(&self, route: &str) -> BoxStream<'static, InsertHistoryRow> {
        let receiver = self.sender_for(route).subscribe();
        BroadcastStream::new(receiver)
            .filter_map(|row| async move { row.ok() })
            .boxed()
    }

    async fn publish(&self, route: &str, row: InsertHistoryRow) {
        // Err here only means there are currently no subscribers; at-least-once
        // delivery to whoever *is* listening is all this bus promises.
        self.sender_for(route).send(row).ok();
    }

    async fn publish_with_ack(&self, route: &str, row: InsertHistoryRow) -> Result<(), SyncError> {
        self.publish(route, row).await;
        Ok(())
    }
}
