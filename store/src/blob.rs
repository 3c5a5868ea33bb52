//! A minimal in-memory `BlobStore`: content is addressed by its own BLAKE3
//! hash, so `put` is naturally idempotent, the reference agent's own blob
//! I/O already keys writes this way. This is just that behavior without an
//! on-disk backing store.

use std::collections::HashMap;

use agent::traits::BlobStore;
use async_trait::async_trait;
use shared::error::SyncError;
use shared::types::BlobId;
use tokio::sync::RwLock;

/// Not durable and not meant for production: it exists so the core crate's
/// properties and scenarios are runnable without standing up a real
/// object store.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<BlobId, SyncError> {
        let id = agent::tree::hash_blob(bytes);
        self.blobs.write().await.entry(id).or_insert_with(|| bytes.to_vec());
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>, SyncError> {
        self.blobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::blob_unavailable(hex::encode(id), id))
    }

    async fn exists(&self, id: &BlobId) -> Result<bool, SyncError> {
        Ok(self.blobs.read().await.contains_key(id))
    }
}
