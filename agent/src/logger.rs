//! A lightweight, broadcastable activity log.
//!
//! Mirrors the reference agent's own `Logger`: a `tokio::sync::broadcast`
//! channel of structured events that any number of subscribers (a UI, a
//! test harness, a file sink) can drain independently, paired with a
//! `log!` convenience macro for fire-and-forget messages. Steady-state
//! reconciler failures are logged rather than propagated, so this is the
//! primary way to observe them.

use serde::Serialize;
use tokio::sync::broadcast::{Receiver, Sender};

/// One entry broadcast on the log channel.
#[derive(Clone, Debug, Serialize)]
pub enum LogEvent {
    /// A free-form informational message.
    Message(String),
    /// A deadline expired; carries the same label/budget as `SyncError::Timeout`.
    Timeout { label: &'static str, budget_ms: u64 },
    /// A steady-state callback swallowed an error to keep the reconciler alive.
    SwallowedError(String),
}

#[derive(Debug)]
pub struct Logger {
    sender: Sender<LogEvent>,
}

impl Logger {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(256);
        Self { sender }
    }

    /// Broadcast a message. Ignored if there are currently no subscribers;
    /// the return value of `Sender::send` isn't meaningful here.
    pub fn log(&self, msg: impl Into<String>) {
        self.sender.send(LogEvent::Message(msg.into())).ok();
    }

    pub fn timeout(&self, label: &'static str, budget_ms: u64) {
        self.sender.send(LogEvent::Timeout { label, budget_ms }).ok();
    }

    pub fn swallowed(&self, err: impl std::fmt::Display) {
        self.sender.send(LogEvent::SwallowedError(err.to_string())).ok();
    }

    pub fn subscribe(&self) -> Receiver<LogEvent> {
        self.sender.subscribe()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

#[macro_export]
macro_rules! log {
    ($logger:expr, $msg:literal $(, $args:expr)*) => {
        { $logger.log(format!($msg, $($args),*)); }
    };
}
