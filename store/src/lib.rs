//! Reference adapters for the sync engine's external collaborators: an
//! in-memory blob store, an in-memory tree store, an in-memory notification
//! bus, and a real `notify`-backed filesystem watcher.
//!
//! None of these are durable or meant for production; they exist so the
//! `agent` crate is a testable crate rather than an unverifiable one, and
//! so two or more in-process "agents" can be wired together end to end
//! (see `src/bin/demo.rs` and `tests/`).

pub mod blob;
pub mod bus;
pub mod tree_store;
pub mod watcher;

pub use blob::InMemoryBlobStore;
pub use bus::InMemoryBus;
pub use tree_store::InMemoryTreeStore;
pub use watcher::NotifyFsWatcher;
