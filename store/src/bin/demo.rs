//! Demo runner: syncs two local directories bidirectionally through one
//! in-process blob store, tree store, and notification bus.
//!
//! Outside the core library's own surface, this is the command-line
//! wrapper and process bootstrap, but a crate with no way to exercise its
//! own reconcilers end to end on real directories is not a complete crate,
//! so it is kept here rather than folded into the library.

use std::path::PathBuf;
use std::sync::Arc;

use agent::inbound::InboundReconciler;
use agent::logger::LogEvent;
use agent::outbound::OutboundReconciler;
use agent::projector::Projector;
use agent::suppressor::BounceSuppressor;
use agent::AgentConfig;
use clap::Parser;
use store::{InMemoryBlobStore, InMemoryBus, InMemoryTreeStore, NotifyFsWatcher};

/// Sync two directories against each other until interrupted.
#[derive(Parser, Debug)]
#[command(name = "sync-demo", version, about)]
struct Args {
    /// First directory to keep in agreement.
    a: PathBuf,
    /// Second directory to keep in agreement.
    b: PathBuf,
    /// Tree key both sides publish and subscribe under.
    #[arg(long, default_value = "sharedTree")]
    tree_key: String,
    /// Path to a TOML file overriding the default agent configuration.
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Side {
    label: &'static str,
    path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AgentConfig::load_overrides_from_toml(path)?,
        None => AgentConfig::default(),
    };

    tokio::fs::create_dir_all(&args.a).await?;
    tokio::fs::create_dir_all(&args.b).await?;

    let blobs = Arc::new(InMemoryBlobStore::new());
    let tree_store = Arc::new(InMemoryTreeStore::new());
    let bus = Arc::new(InMemoryBus::new());

    let sides = [Side { label: "A", path: args.a.clone() }, Side { label: "B", path: args.b.clone() }];

    let mut stop_handles = Vec::new();

    for side in sides {
        let watcher = Arc::new(NotifyFsWatcher::new(&side.path)?);
        let projector = Arc::new(Projector::new(Arc::clone(&blobs)));
        let suppressor = Arc::new(BounceSuppressor::new());
        let logger = Arc::new(agent::logger::Logger::new());

        let mut log_rx = logger.subscribe();
        let label = side.label;
        tokio::spawn(async move {
            while let Ok(event) = log_rx.recv().await {
                match event {
                    LogEvent::Message(msg) => println!("[{label}] {msg}"),
                    LogEvent::Timeout { label: op, budget_ms } => {
                        println!("[{label}] timeout: {op} exceeded {budget_ms}ms")
                    }
                    LogEvent::SwallowedError(err) => println!("[{label}] swallowed error: {err}"),
                }
            }
        });

        let outbound = Arc::new(OutboundReconciler::new(
            Arc::clone(&projector),
            Arc::clone(&tree_store),
            Arc::clone(&bus),
            Arc::clone(&watcher),
            Arc::clone(&suppressor),
            Arc::clone(&logger),
        ));

        let outbound_stop = outbound
            .start_publishing(
                side.path.clone(),
                args.tree_key.clone(),
                config.scan.clone(),
                config.timeouts,
                config.require_ack,
            )
            .await?;

        let inbound = Arc::new(InboundReconciler::new(projector, Arc::clone(&tree_store), Arc::clone(&bus), watcher, suppressor, logger));

        let inbound_stop = inbound
            .start_consuming(side.path.clone(), args.tree_key.clone(), config.restore, config.scan.clone(), config.timeouts)
            .await?;

        println!("[{label}] syncing {}", side.path.display());
        stop_handles.push(outbound_stop);
        stop_handles.push(inbound_stop);
    }

    tokio::signal::ctrl_c().await?;
    println!("shutting down");
    for handle in stop_handles {
        handle.stop();
    }

    Ok(())
}
