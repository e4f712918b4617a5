//! Type-safe identifiers for routing and tracing.
//!
//! | Type | Wraps | Purpose |
//! |------|-------|---------|
//! | [`Topic`] | `String` | Routing key for the subscription registry |
//! | [`MessageId`] | `String` | Locally generated outbound message id |
//! | [`ListenerId`] | `u64` | Identity of one registered callback |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Length of the random suffix in a [`MessageId`].
const MESSAGE_ID_SUFFIX_LEN: usize = 9;

/// Counter backing [`ListenerId::next`].
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Topic
// ============================================================================

/// Routing key derived from a message type and optional correlation id.
///
/// Per-entity topics are built with [`Topic::job_progress`] and
/// [`Topic::chat`]; global topics have associated constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Global notifications topic.
    pub const NOTIFICATION: &'static str = "notification";
    /// Global system alert topic.
    pub const SYSTEM_ALERT: &'static str = "system_alert";
    /// Connection lifecycle topic emitted by the client itself.
    pub const CONNECTION: &'static str = "connection";
    /// Transport error topic emitted by the client itself.
    pub const ERROR: &'static str = "error";
    /// Reconnect scheduling topic emitted by the client itself.
    pub const RECONNECTING: &'static str = "reconnecting";

    /// Creates a topic from any string key.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Progress topic for one processing job: `job_progress_{job_id}`.
    #[inline]
    #[must_use]
    pub fn job_progress(job_id: &str) -> Self {
        Self(format!("job_progress_{job_id}"))
    }

    /// Message topic for one chat session: `chat_{session_id}`.
    #[inline]
    #[must_use]
    pub fn chat(session_id: &str) -> Self {
        Self(format!("chat_{session_id}"))
    }

    /// The global `notification` topic.
    #[inline]
    #[must_use]
    pub fn notification() -> Self {
        Self::new(Self::NOTIFICATION)
    }

    /// The global `system_alert` topic.
    #[inline]
    #[must_use]
    pub fn system_alert() -> Self {
        Self::new(Self::SYSTEM_ALERT)
    }

    /// The internal `connection` topic.
    #[inline]
    #[must_use]
    pub fn connection() -> Self {
        Self::new(Self::CONNECTION)
    }

    /// The internal `error` topic.
    #[inline]
    #[must_use]
    pub fn error() -> Self {
        Self::new(Self::ERROR)
    }

    /// The internal `reconnecting` topic.
    #[inline]
    #[must_use]
    pub fn reconnecting() -> Self {
        Self::new(Self::RECONNECTING)
    }

    /// Returns the topic key.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Topic {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Locally generated id attached to every outbound message.
///
/// Format: `{unix_millis}-{9 hex chars}`. Used for tracing only; the server
/// never acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh id from the current time and a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("{millis}-{}", &random[..MESSAGE_ID_SUFFIX_LEN]))
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Identity of a single callback registration.
///
/// Unique for the lifetime of the process, so an unsubscribe handle can
/// never remove a later registration that reuses the same closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    #[test]
    fn test_topic_keys() {
        assert_eq!(Topic::job_progress("job-1").as_str(), "job_progress_job-1");
        assert_eq!(Topic::chat("s-9").as_str(), "chat_s-9");
        assert_eq!(Topic::notification().as_str(), "notification");
        assert_eq!(Topic::system_alert().as_str(), "system_alert");
    }

    #[test]
    fn test_topic_from_str_matches_constructor() {
        assert_eq!(Topic::from("connection"), Topic::connection());
    }

    #[test]
    fn test_message_id_format() {
        let id = MessageId::generate();
        let (millis, suffix) = id.as_str().split_once('-').expect("separator");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), MESSAGE_ID_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_message_ids_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| MessageId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_listener_ids_increase() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert!(b > a);
    }
}
