//! The bounce-back suppressor: the pair of fields shared by the
//! outbound and inbound reconcilers that stops the publish/consume ring
//! from looping forever.
//!
//! Both reconcilers hold the same `tokio::sync::Mutex` for the full
//! duration of one coalesced callback, so a publish and a restore never
//! interleave their reads and writes of `last_sent_root` /
//! `last_sent_content_key`.

use shared::types::RootHash;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct SuppressorState {
    last_sent_root: Option<RootHash>,
    last_sent_content_key: Option<String>,
}

impl SuppressorState {
    pub fn last_sent_root(&self) -> Option<&RootHash> {
        self.last_sent_root.as_ref()
    }

    pub fn last_sent_content_key(&self) -> Option<&str> {
        self.last_sent_content_key.as_deref()
    }

    /// Record the outcome of a publish or a post-restore bookkeeping insert.
    pub fn record(&mut self, root: RootHash, content_key: String) {
        self.last_sent_root = Some(root);
        self.last_sent_content_key = Some(content_key);
    }
}

/// Shared, mutually-exclusive home for the suppressor state.
pub struct BounceSuppressor {
    state: Mutex<SuppressorState>,
}

impl BounceSuppressor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SuppressorState::default()),
        }
    }

    /// Acquire exclusive access for the duration of one coalesced callback.
    /// Hold the guard across every await point of that callback so no other
    /// reconciler can interleave its own coalesced work.
    pub async fn lock(&self) -> MutexGuard<'_, SuppressorState> {
        self.state.lock().await
    }
}

impl Default for BounceSuppressor {
    fn default() -> Self {
        Self::new()
    }
}
