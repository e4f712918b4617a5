//! Real-time client: one connection per instance.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RealtimeClient`] | Connection lifecycle, sends and subscriptions |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ReconnectPolicy`] | Exponential backoff with an attempt ceiling |
//! | [`ConnectionState`] | `Disconnected` / `Connecting` / `Open` / `Closing` |
//!
//! # Internal Topics
//!
//! | Topic | Payload |
//! |-------|---------|
//! | `connection` | `{status: "connected"}` or `{status: "disconnected", code, reason, willReconnect}` |
//! | `reconnecting` | `{attempt, delayMs}` |
//! | `error` | `{message, detail}` |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Liveness pings.
pub mod heartbeat;

/// Reconnection backoff.
pub mod policy;

/// Connection state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ClientBuilder, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_URL};
pub use core::RealtimeClient;
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
