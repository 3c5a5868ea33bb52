//! Default budgets and other constants shared by the engine and its adapters.

/// Timeout for a single node-by-hash store query.
pub const DEFAULT_DB_QUERY_MS: u64 = 10_000;

/// Timeout for a whole-tree recursive fetch, also used for a single insert.
pub const DEFAULT_FETCH_TREE_MS: u64 = 20_000;

/// Timeout for `projector::extract`.
pub const DEFAULT_EXTRACT_MS: u64 = 15_000;

/// Timeout for `projector::restore`.
pub const DEFAULT_RESTORE_MS: u64 = 15_000;

/// Timeout for an entire inbound reconciler callback.
pub const DEFAULT_SYNC_CALLBACK_MS: u64 = 25_000;

/// Coalescing quiet period for both reconcilers. Not a timeout.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
