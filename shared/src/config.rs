//! Per-agent configuration: ignore patterns, scan depth, symlink handling,
//! restore pruning, publish acknowledgement, and the deadline budgets.
//!
//! Mirrors the reference agent's `defaults.rs` (one constant per tunable,
//! with a matching `Default` impl) rather than a database-backed settings
//! store. Nothing here needs to persist across restarts, it is handed to
//! the engine once at startup and may be overridden from a TOML file the
//! way `backpak.toml` overrides are loaded.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{constants::*, error::SyncError};

/// Timeout budgets for every deadline-wrapped operation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub db_query_ms: u64,
    pub fetch_tree_ms: u64,
    pub extract_ms: u64,
    pub restore_ms: u64,
    pub sync_callback_ms: u64,
    pub debounce_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            db_query_ms: DEFAULT_DB_QUERY_MS,
            fetch_tree_ms: DEFAULT_FETCH_TREE_MS,
            extract_ms: DEFAULT_EXTRACT_MS,
            restore_ms: DEFAULT_RESTORE_MS,
            sync_callback_ms: DEFAULT_SYNC_CALLBACK_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Options controlling `projector::extract` / `projector::scan`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanOptions {
    /// Glob-like patterns skipped during scan.
    pub ignore: Vec<String>,
    /// Root counts as depth 0. `None` means unbounded.
    pub max_depth: Option<u32>,
    /// Whether to descend into symlinked directories / read symlinked files.
    pub follow_symlinks: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            max_depth: None,
            follow_symlinks: false,
        }
    }
}

/// Options controlling `projector::restore`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RestoreOptions {
    /// Remove any path under the target not present in the restored tree.
    pub clean_target: bool,
}

/// All per-agent tunables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub scan: ScanOptions,
    pub restore: RestoreOptions,
    /// When set, `publish` blocks until the bus acknowledges receipt.
    pub require_ack: bool,
    pub timeouts: Timeouts,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            restore: RestoreOptions::default(),
            require_ack: false,
            timeouts: Timeouts::default(),
        }
    }
}

impl AgentConfig {
    /// Merge overrides from a TOML file onto the defaults. Unset fields in
    /// the file keep their default value. A missing file is not an error,
    /// the agent simply runs with defaults, the same tolerance a missing
    /// `backpak.toml` gets from its own loader.
    pub fn load_overrides_from_toml(path: &Path) -> Result<Self, SyncError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::IoFailure(e)),
        };

        toml::from_str(&text).map_err(|e| SyncError::StoreFailure(format!("invalid config at {}: {e}", path.display())))
    }
}
