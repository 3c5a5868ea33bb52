//! Error kinds shared by the projector, the reconcilers, and the store/bus
//! adapters. Structured the way the reference agent's `PackfileError` wraps
//! its underlying failures rather than stringifying them.

use std::path::PathBuf;

use crate::types::{BlobId, NodeHash, RootHash};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("tree or ref failed invariants: {0}")]
    InvalidInput(String),

    #[error("root path or root hash not found: {0}")]
    NotFound(String),

    #[error("scan target {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("blob {blob_id} referenced by {relative_path} is unavailable")]
    BlobUnavailable {
        relative_path: String,
        blob_id: String,
    },

    #[error("tree fetch saw a dangling child hash {0}")]
    Incomplete(String),

    #[error("underlying store/bus/blob failure: {0}")]
    StoreFailure(String),

    #[error("deadline '{label}' ({budget_ms}ms) expired")]
    Timeout { label: &'static str, budget_ms: u64 },

    #[error("{0}")]
    IoFailure(#[from] std::io::Error),
}

impl SyncError {
    pub fn blob_unavailable(relative_path: impl Into<String>, blob_id: &BlobId) -> Self {
        Self::BlobUnavailable {
            relative_path: relative_path.into(),
            blob_id: hex::encode(blob_id),
        }
    }

    pub fn incomplete(hash: &NodeHash) -> Self {
        Self::Incomplete(hex::encode(hash))
    }

    pub fn not_found_root(hash: &RootHash) -> Self {
        Self::NotFound(hex::encode(hash))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
