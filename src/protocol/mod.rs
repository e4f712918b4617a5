//! Real-time protocol message types.
//!
//! Every frame in both directions is a JSON text frame with the same
//! envelope:
//!
//! | Field | Direction | Purpose |
//! |-------|-----------|---------|
//! | `type` | both | Message type, drives routing |
//! | `data` | both | Type-specific payload |
//! | `timestamp` | both | ISO-8601 send time |
//! | `id` | both | Message id (tracing only) |
//!
//! # Known Inbound Types
//!
//! | Type | Payload | Topic |
//! |------|---------|-------|
//! | `job_progress` | [`JobProgress`] | `job_progress_{jobId}` |
//! | `chat_message` | [`ChatPayload`] | `chat_{sessionId}` |
//! | `notification` | [`NotificationPayload`] | `notification` |
//! | `system_alert` | [`SystemAlert`] | `system_alert` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Inbound/outbound envelope |
//! | `payload` | Typed payloads of the known inbound types |

// ============================================================================
// Submodules
// ============================================================================

/// Message envelope types.
pub mod message;

/// Typed payloads.
pub mod payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{InboundMessage, MessageKind, OutboundMessage, now_timestamp};
pub use payload::{
    AlertLevel, ChatBody, ChatEntry, ChatPayload, JobProgress, JobStatus, NotificationPayload,
    SystemAlert,
};
