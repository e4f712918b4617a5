//! Wire envelope for both directions of the real-time channel.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "job_progress",
//!   "data": { "jobId": "job-1", "progress": 42 },
//!   "timestamp": "2024-05-01T12:00:00.000Z",
//!   "id": "1714564800000-3f9a1c2b7"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

// ============================================================================
// MessageKind
// ============================================================================

/// Inbound message types the router knows how to correlate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind<'a> {
    /// Per-job progress update.
    JobProgress,
    /// Chat message or typing indicator for a session.
    ChatMessage,
    /// User notification.
    Notification,
    /// System-wide alert.
    SystemAlert,
    /// Any other type, forwarded by name.
    Other(&'a str),
}

impl<'a> MessageKind<'a> {
    /// Wire name for [`MessageKind::JobProgress`].
    pub const JOB_PROGRESS: &'static str = "job_progress";
    /// Wire name for [`MessageKind::ChatMessage`].
    pub const CHAT_MESSAGE: &'static str = "chat_message";
    /// Wire name for [`MessageKind::Notification`].
    pub const NOTIFICATION: &'static str = "notification";
    /// Wire name for [`MessageKind::SystemAlert`].
    pub const SYSTEM_ALERT: &'static str = "system_alert";

    /// Classifies a wire type string.
    #[must_use]
    pub fn from_type(kind: &'a str) -> Self {
        match kind {
            Self::JOB_PROGRESS => Self::JobProgress,
            Self::CHAT_MESSAGE => Self::ChatMessage,
            Self::NOTIFICATION => Self::Notification,
            Self::SYSTEM_ALERT => Self::SystemAlert,
            other => Self::Other(other),
        }
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A message pushed by the server.
///
/// Only `type` is required. Frames such as `heartbeat` or `pong` carry no
/// `data`/`id`, so those fields default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,

    /// Server timestamp (ISO-8601), if sent.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Server message id, if sent.
    #[serde(default)]
    pub id: Option<String>,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if it is not an object with a string `type`
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.get("type").is_some_and(Value::is_string) {
            return Err(Error::protocol("frame has no string `type` field"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the classified message type.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MessageKind<'_> {
        MessageKind::from_type(&self.kind)
    }

    /// Gets a string field from `data`, accepting either of two spellings.
    #[must_use]
    pub fn data_str(&self, key: &str, alias: &str) -> Option<&str> {
        self.data
            .get(key)
            .or_else(|| self.data.get(alias))
            .and_then(Value::as_str)
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// A message written by the client.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Caller-defined payload.
    pub data: Value,

    /// Local send time.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Locally generated id.
    pub id: MessageId,
}

impl OutboundMessage {
    /// Creates a message stamped with the current time and a fresh id.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
            id: MessageId::generate(),
        }
    }

    /// Serializes the message to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if `data` cannot be
    /// serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current time in the envelope's timestamp format.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_timestamp<S>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// ============================================================================
// Tests
// ============================================================================
