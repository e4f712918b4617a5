//! Docstream Realtime - live update layer for the document-processing client.
//!
//! One WebSocket connection carries every server push: job progress, chat
//! messages, notifications and system alerts. Incoming messages are routed
//! to topic keys and fanned out to the callbacks subscribed on them.
//!
//! # Architecture
//!
//! ```text
//!  Transport ──► link task ──► TopicRouter ──► SubscriptionRegistry ──► listeners
//!      ▲              │                                 ▲
//!      │              └── connection / reconnecting / error (internal topics)
//!      └── send(): Open only, dropped with a warning otherwise
//! ```
//!
//! - One [`RealtimeClient`] owns one physical connection
//! - The token travels as the `token` query parameter of the handshake
//! - A `ping` goes out every 30 seconds while open
//! - Abnormal closures reconnect with capped exponential backoff
//! - Listener panics are caught and logged per listener
//!
//! # Quick Start
//!
//! ```no_run
//! use docstream_realtime::{RealtimeClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = RealtimeClient::builder()
//!         .url("wss://api.example.com/ws")
//!         .build()?;
//!
//!     let _progress = client.subscribe_to_job_progress("job-1", |data| {
//!         println!("job-1: {data}");
//!     });
//!
//!     client.connect("bearer-token");
//!     client.request_job_updates("job-1");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`RealtimeClient`], builder, reconnect policy, heartbeat |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`Topic`], [`MessageId`], [`ListenerId`] |
//! | [`protocol`] | Message envelope and typed payloads |
//! | [`router`] | Topic derivation and the subscription registry |
//! | [`sync`] | Caches for jobs, chat, notifications, connection quality |
//! | [`transport`] | Transport seam and the WebSocket implementation |

// ============================================================================
// Modules
// ============================================================================

/// Real-time client.
///
/// Use [`RealtimeClient::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// Only configuration and transport setup return [`Result<T>`]; runtime
/// failures are published on the `error` topic.
pub mod error;

/// Topic keys and message identifiers.
pub mod identifiers;

/// Real-time message types.
pub mod protocol;

/// Topic routing and subscriptions.
pub mod router;

/// Domain synchronizers.
pub mod sync;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ClientBuilder, ConnectionState, RealtimeClient, ReconnectPolicy};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, MessageId, Topic};

// Protocol types
pub use protocol::{InboundMessage, JobProgress, JobStatus, OutboundMessage};

// Router types
pub use router::{Subscription, SubscriptionRegistry, TopicRouter};

// Synchronizers
pub use sync::{
    ChatSessions, ConnectionMonitor, ConnectionQuality, JobTracker, NotificationCenter,
    ProcessingJob,
};

// Transport types
pub use transport::{Transport, WebSocketTransport};
