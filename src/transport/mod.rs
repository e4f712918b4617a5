//! Transport seam between the client and the network.
//!
//! The client never touches a socket directly. It asks a [`Transport`] for a
//! [`TransportLink`]: a pair of channels carrying outgoing [`Frame`]s and
//! incoming [`TransportEvent`]s, covering the four WebSocket lifecycle
//! callbacks:
//!
//! | Callback | Link equivalent |
//! |----------|-----------------|
//! | open | `Transport::connect` returns `Ok(link)` |
//! | message | [`TransportEvent::Message`] |
//! | error | [`TransportEvent::Error`], or `connect` returning `Err` |
//! | close | [`TransportEvent::Closed`], or the event channel ending |
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   Frame    ┌──────────────┐   WebSocket   ┌────────┐
//! │  RealtimeClient  │ ─────────► │  link pump   │ ◄───────────► │ server │
//! │  (link task)     │ ◄───────── │  (tokio task)│               └────────┘
//! └──────────────────┘  Transport └──────────────┘
//!                        Event
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite implementation |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport over tokio-tungstenite.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketTransport;

// ============================================================================
// CloseInfo
// ============================================================================

/// Close code and reason reported when a link ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Normal closure. The only code treated as intentional.
    pub const NORMAL: u16 = 1000;

    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    /// Creates close info from a code and reason.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal (code 1000) closure.
    #[inline]
    #[must_use]
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(Self::NORMAL, reason)
    }

    /// Abnormal (code 1006) closure.
    #[inline]
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Self::ABNORMAL, reason)
    }

    /// Returns `true` for code 1000.
    #[inline]
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL
    }
}

// ============================================================================
// Frame / TransportEvent
// ============================================================================

/// Outgoing frame written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON text frame.
    Text(String),
    /// Close the link with the given code and reason.
    Close(CloseInfo),
}

/// Event observed on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame from the server.
    Message(String),
    /// Transport-level error. Does not end the link by itself.
    Error(String),
    /// Link closed. No further events follow.
    Closed(CloseInfo),
}

// ============================================================================
// TransportLink
// ============================================================================

/// An open physical connection, expressed as a pair of channels.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to write.
    pub outgoing: mpsc::UnboundedSender<Frame>,
    /// Events read from the connection.
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

// ============================================================================
// Transport
// ============================================================================

/// Opens physical connections for the client.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a link to `url`, completing the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is refused or the handshake fails.
    async fn connect(&self, url: &Url) -> Result<TransportLink>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_info() {
        assert!(CloseInfo::normal("bye").is_normal());
        assert!(!CloseInfo::abnormal("drop").is_normal());
        assert_eq!(CloseInfo::abnormal("").code, 1006);
        assert!(!CloseInfo::new(4001, "Authentication required").is_normal());
    }
}
