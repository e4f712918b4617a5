//! Connection lifecycle state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::transport::Frame;

// ============================================================================
// ConnectionState
// ============================================================================

/// State of the single physical connection.
///
/// ```text
///             connect()                 open
/// Disconnected ────────► Connecting ──────────► Open
///      ▲                     │                    │
///      │      close          │ disconnect()       │ disconnect()
///      ├─────────────────────┘──────────┐         │
///      │                                ▼         ▼
///      └─────────────── close ──────── Closing ◄──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No link, no handshake in flight.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Link open; sends are written.
    Open,
    /// Deliberate close requested, waiting for the transport to confirm.
    Closing,
}

impl ConnectionState {
    /// Returns the lowercase state name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ReconnectState
// ============================================================================

/// Backoff bookkeeping. Reset whenever the connection reaches `Open`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReconnectState {
    /// Attempts scheduled since the last successful open.
    pub attempt_count: u32,
    /// `true` while a handshake is in flight.
    pub is_connecting: bool,
}

// ============================================================================
// ClientState
// ============================================================================

/// Mutable client state, guarded by one mutex.
///
/// `generation` advances on every `connect` and `disconnect`. Timers capture
/// it when spawned and do nothing once it has moved on. `link_id` is the
/// generation of the link whose transport events are still accepted.
#[derive(Default)]
pub(crate) struct ClientState {
    pub connection: ConnectionState,
    pub reconnect: ReconnectState,
    pub generation: u64,
    pub link_id: Option<u64>,
    pub outgoing: Option<mpsc::UnboundedSender<Frame>>,
    pub token: Option<String>,
    pub heartbeat: Option<JoinHandle<()>>,
    pub reconnect_timer: Option<JoinHandle<()>>,
}

impl ClientState {
    /// Aborts the heartbeat task, if running.
    pub fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }

    /// Aborts the pending reconnect timer, if any.
    pub fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }

    /// Returns `true` if `generation` still owns an open link.
    #[inline]
    pub fn is_open_generation(&self, generation: u64) -> bool {
        self.generation == generation && self.connection == ConnectionState::Open
    }
}

// ============================================================================
// Tests
// ============================================================================
