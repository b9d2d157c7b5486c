//! User-facing notification channel.
//!
//! A [`Notifier`] owns a registry of listeners, each subscribed for one user
//! (or for `"*"`, which receives every message). [`Notifier::send`] is
//! fire-and-forget: delivery to a listener whose receiver was dropped is
//! swallowed and the listener is pruned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Recipient that addresses every listener.
pub const BROADCAST: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Success,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Success => "success",
            Severity::Danger => "danger",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user: String,
    pub message: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

/// Handle returned by [`Notifier::subscribe`].
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::UnboundedReceiver<Notification>,
}

struct Listener {
    user: String,
    tx: mpsc::UnboundedSender<Notification>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

#[derive(Default)]
pub struct Notifier {
    registry: Mutex<Registry>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener for `user` (`"*"` listens to everyone).
    pub fn subscribe(&self, user: &str) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let mut reg = self.registry();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.listeners.insert(
            id,
            Listener {
                user: user.to_string(),
                tx,
            },
        );
        Subscription { id, receiver }
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.registry().listeners.remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listeners.len()
    }

    /// Deliver a message to every listener of `user`, or to all listeners
    /// when `user` is `"*"`.
    pub fn send(&self, user: &str, message: impl Into<String>, severity: Severity) {
        let note = Notification {
            user: user.to_string(),
            message: message.into(),
            severity,
            at: Utc::now(),
        };
        log::debug!("notify [{}] {}: {}", severity, user, note.message);

        let mut reg = self.registry();
        let mut dead = Vec::new();
        for (id, listener) in &reg.listeners {
            let wanted = user == BROADCAST || listener.user == BROADCAST || listener.user == user;
            if wanted && listener.tx.send(note.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            reg.listeners.remove(&id);
        }
    }
}
