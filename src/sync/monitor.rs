//! Connection quality derived from the client's lifecycle topics.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::identifiers::Topic;
use crate::router::SubscriptionRegistry;

use super::Handles;

// ============================================================================
// ConnectionQuality
// ============================================================================

/// Coarse connection health for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionQuality {
    /// Connection open.
    Good,
    /// Closed, retry pending.
    Reconnecting,
    /// Closed, no retry pending.
    #[default]
    Offline,
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Good => "good",
            Self::Reconnecting => "reconnecting",
            Self::Offline => "offline",
        })
    }
}

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Snapshot of everything the monitor has observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current quality, also published on the watch channel.
    pub quality: ConnectionQuality,
    /// Closures seen since the monitor was created.
    pub disconnects: u64,
    /// Close code of the last closure.
    pub last_close_code: Option<u16>,
    /// Attempt number and delay of the last scheduled reconnect.
    pub last_reconnect: Option<(u32, Duration)>,
    /// Detail of the last transport error.
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    fn on_connection(&mut self, data: &Value) {
        match data["status"].as_str() {
            Some("connected") => {
                self.quality = ConnectionQuality::Good;
                self.last_reconnect = None;
            }
            Some("disconnected") => {
                self.disconnects += 1;
                self.last_close_code = data["code"]
                    .as_u64()
                    .and_then(|code| u16::try_from(code).ok());
                self.quality = if data["willReconnect"].as_bool().unwrap_or(false) {
                    ConnectionQuality::Reconnecting
                } else {
                    ConnectionQuality::Offline
                };
            }
            _ => {}
        }
    }

    fn on_reconnecting(&mut self, data: &Value) {
        let attempt = data["attempt"].as_u64().and_then(|a| u32::try_from(a).ok());
        let delay = data["delayMs"].as_u64().map(Duration::from_millis);
        if let (Some(attempt), Some(delay)) = (attempt, delay) {
            self.last_reconnect = Some((attempt, delay));
            self.quality = ConnectionQuality::Reconnecting;
        }
    }

    fn on_error(&mut self, data: &Value) {
        let detail = data["detail"]
            .as_str()
            .or_else(|| data["message"].as_str())
            .unwrap_or("unknown error");
        self.last_error = Some(detail.to_string());
    }
}

// ============================================================================
// ConnectionMonitor
// ============================================================================

type Apply = fn(&mut ConnectionStatus, &Value);

struct Shared {
    status: Mutex<ConnectionStatus>,
    tx: watch::Sender<ConnectionQuality>,
    handles: Handles,
}

/// Tracks [`ConnectionQuality`] from the `connection`, `reconnecting` and
/// `error` topics.
#[derive(Clone)]
pub struct ConnectionMonitor {
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("status", &*self.shared.status.lock())
            .finish()
    }
}

impl ConnectionMonitor {
    /// Creates a monitor and subscribes it immediately.
    #[must_use]
    pub fn new(registry: &SubscriptionRegistry) -> Self {
        let (tx, _rx) = watch::channel(ConnectionQuality::default());
        let shared = Arc::new(Shared {
            status: Mutex::new(ConnectionStatus::default()),
            tx,
            handles: Handles::default(),
        });

        let topics: [(&'static str, Apply); 3] = [
            (Topic::CONNECTION, ConnectionStatus::on_connection),
            (Topic::RECONNECTING, ConnectionStatus::on_reconnecting),
            (Topic::ERROR, ConnectionStatus::on_error),
        ];

        for (topic, apply) in topics {
            let weak = Arc::downgrade(&shared);
            shared.handles.insert_with(topic, || {
                registry.subscribe(topic, move |data: &Value| observe(&weak, apply, data))
            });
        }

        Self { shared }
    }

    /// Returns the current quality.
    #[must_use]
    pub fn quality(&self) -> ConnectionQuality {
        *self.shared.tx.borrow()
    }

    /// Returns a snapshot of the full status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.lock().clone()
    }

    /// Returns a receiver that changes when the quality changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionQuality> {
        self.shared.tx.subscribe()
    }
}

fn observe(shared: &Weak<Shared>, apply: Apply, data: &Value) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let quality = {
        let mut status = shared.status.lock();
        apply(&mut status, data);
        status.quality
    };

    let changed = shared.tx.send_if_modified(|current| {
        if *current == quality {
            return false;
        }
        *current = quality;
        true
    });
    if changed {
        debug!(%quality, "Connection quality changed");
    }
}

// ============================================================================
// Tests
// ============================================================================
