//! Inbound message classification.
//!
//! | Type | Topic |
//! |------|-------|
//! | `job_progress` | `job_progress_{data.jobId}` |
//! | `chat_message` | `chat_{data.sessionId}` |
//! | `notification` | `notification` |
//! | `system_alert` | `system_alert` |
//! | anything else | the raw type |
//!
//! A correlated type whose id is missing falls back to its raw type.

// ============================================================================
// Imports
// ============================================================================

use tracing::{trace, warn};

use crate::identifiers::Topic;
use crate::protocol::{InboundMessage, MessageKind};

use super::SubscriptionRegistry;

// ============================================================================
// Topic Derivation
// ============================================================================

/// Derives the topic an inbound message is delivered on.
#[must_use]
pub fn topic_for(message: &InboundMessage) -> Topic {
    match message.kind() {
        MessageKind::JobProgress => match message.data_str("jobId", "job_id") {
            Some(job_id) => Topic::job_progress(job_id),
            None => {
                warn!("job_progress without jobId");
                Topic::new(message.kind.as_str())
            }
        },
        MessageKind::ChatMessage => match message.data_str("sessionId", "session_id") {
            Some(session_id) => Topic::chat(session_id),
            None => {
                warn!("chat_message without sessionId");
                Topic::new(message.kind.as_str())
            }
        },
        MessageKind::Notification => Topic::notification(),
        MessageKind::SystemAlert => Topic::system_alert(),
        MessageKind::Other(kind) => Topic::new(kind),
    }
}

// ============================================================================
// TopicRouter
// ============================================================================

/// Fans inbound messages out to the registry.
///
/// Holds no state of its own beyond the registry handle.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    registry: SubscriptionRegistry,
}

impl TopicRouter {
    /// Creates a router that emits into `registry`.
    #[inline]
    #[must_use]
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self { registry }
    }

    /// Emits `message.data` on the message's topic, exactly once.
    ///
    /// Returns the number of listeners that received it.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let topic = topic_for(message);
        trace!(kind = %message.kind, topic = %topic, "Routing message");
        self.registry.emit(topic.as_str(), &message.data)
    }

    /// Returns the registry this router emits into.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }
}

// ============================================================================
// Tests
// ============================================================================
