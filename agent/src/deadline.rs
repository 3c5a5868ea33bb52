//! Bounds every call to an external collaborator with a labeled timeout.
//! Every suspension point that talks to the blob store, tree store,
//! bus, or a filesystem bulk operation is wrapped here so a stalled
//! collaborator surfaces as a `SyncError::Timeout` carrying its label
//! rather than hanging the reconciler forever.

use std::future::Future;
use std::time::Duration;

use shared::error::SyncError;

/// Run `fut` under a deadline of `budget_ms` milliseconds, tagged `label`.
pub async fn with_deadline<T, F>(label: &'static str, budget_ms: u64, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    match tokio::time::timeout(Duration::from_millis(budget_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout { label, budget_ms }),
    }
}
