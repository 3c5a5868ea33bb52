//! The sync engine of one agent: turn a directory into an immutable,
//! content-addressed tree and back, publish every observed state, and
//! reconcile incoming remote state against local content.
//!
//! The blob store, the tree store, the notification bus, and the filesystem
//! watcher primitive are external collaborators; this crate only defines the
//! traits they must satisfy (see [`traits`]) plus the reconciliation logic
//! that drives them. A companion crate, `store`, provides minimal in-memory
//! implementations of those traits for tests and demos.

pub mod deadline;
pub mod inbound;
pub mod logger;
pub mod outbound;
pub mod projector;
pub mod suppressor;
pub mod traits;
pub mod tree;

pub use shared::{config::AgentConfig, error::SyncError};
