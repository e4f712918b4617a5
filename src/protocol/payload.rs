//! Typed `data` payloads of the known inbound message types.
//!
//! The router delivers raw JSON; synchronizers decode it into these types
//! with [`serde_json::from_value`]. Every field except the correlation id is
//! optional so partial updates decode and merge field by field.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Job Progress
// ============================================================================

/// Lifecycle status of a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet queued.
    Pending,
    /// Waiting for a worker.
    Queued,
    /// Being processed.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped by the user.
    Cancelled,
    /// Status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Returns `true` once no further progress updates are expected.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// `job_progress` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// Job the update belongs to.
    #[serde(alias = "job_id")]
    pub job_id: String,

    /// New status.
    #[serde(default)]
    pub status: Option<JobStatus>,

    /// Percent complete, 0-100.
    #[serde(default)]
    pub progress: Option<f64>,

    /// Name of the stage currently running.
    #[serde(default, alias = "current_stage")]
    pub current_stage: Option<String>,

    /// Server estimate of completion time.
    #[serde(default, alias = "estimated_completion")]
    pub estimated_completion: Option<String>,

    /// Documents finished so far.
    #[serde(default, alias = "documents_processed")]
    pub documents_processed: Option<u64>,

    /// Full error list; replaces any previous list.
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

// ============================================================================
// Chat
// ============================================================================

/// One chat transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// Server id of the message.
    #[serde(default)]
    pub id: Option<String>,

    /// Author role (`user`, `assistant`, ...).
    #[serde(default)]
    pub role: Option<String>,

    /// Author user id.
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,

    /// Message text.
    pub content: String,

    /// Server timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Body of a `chat_message`: either a bare string or a structured entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatBody {
    /// Plain text.
    Text(String),
    /// Structured message.
    Entry(ChatEntry),
}

impl ChatBody {
    /// Converts the body into a transcript entry.
    #[must_use]
    pub fn into_entry(self, user_id: Option<String>) -> ChatEntry {
        match self {
            Self::Text(content) => ChatEntry {
                id: None,
                role: None,
                user_id,
                content,
                timestamp: None,
            },
            Self::Entry(mut entry) => {
                if entry.user_id.is_none() {
                    entry.user_id = user_id;
                }
                entry
            }
        }
    }
}

/// `chat_message` payload: carries either a message or a typing flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    /// Session the payload belongs to.
    #[serde(alias = "session_id")]
    pub session_id: String,

    /// New message, if any.
    #[serde(default)]
    pub message: Option<ChatBody>,

    /// Typing indicator, if any.
    #[serde(default, alias = "is_typing")]
    pub is_typing: Option<bool>,

    /// User the payload originates from.
    #[serde(default, alias = "user_id")]
    pub user_id: Option<String>,
}

// ============================================================================
// Notifications
// ============================================================================

/// `notification` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Notification id.
    pub id: String,

    /// Notification category (`info`, `success`, `warning`, `error`).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Short title.
    #[serde(default)]
    pub title: String,

    /// Body text.
    #[serde(default)]
    pub message: String,

    /// When the notification stops being relevant.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Severity of a system alert, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational.
    Info,
    /// Degraded service.
    Warning,
    /// Outage or failure.
    Error,
    /// Severe outage.
    Critical,
}

/// `system_alert` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAlert {
    /// Severity.
    pub level: AlertLevel,

    /// Alert text.
    pub message: String,

    /// When the alert stops being relevant.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{from_value, json};

    #[test]
    fn test_job_progress_partial() {
        let progress: JobProgress =
            from_value(json!({ "jobId": "job-1", "progress": 42 })).expect("decode");
        assert_eq!(progress.job_id, "job-1");
        assert_eq!(progress.progress, Some(42.0));
        assert!(progress.status.is_none());
        assert!(progress.errors.is_none());
    }

    #[test]
    fn test_job_progress_snake_case() {
        let progress: JobProgress = from_value(json!({
            "job_id": "job-2",
            "status": "completed",
            "current_stage": "indexing",
            "documents_processed": 7
        }))
        .expect("decode");
        assert_eq!(progress.status, Some(JobStatus::Completed));
        assert_eq!(progress.current_stage.as_deref(), Some("indexing"));
        assert_eq!(progress.documents_processed, Some(7));
    }

    #[test]
    fn test_unknown_job_status() {
        let progress: JobProgress =
            from_value(json!({ "jobId": "j", "status": "paused" })).expect("decode");
        assert_eq!(progress.status, Some(JobStatus::Unknown));
        assert!(!JobStatus::Unknown.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_chat_text_and_entry() {
        let text: ChatPayload =
            from_value(json!({ "sessionId": "s", "message": "hi", "userId": "u1" })).expect("decode");
        let entry = text.message.clone().expect("message").into_entry(text.user_id.clone());
        assert_eq!(entry.content, "hi");
        assert_eq!(entry.user_id.as_deref(), Some("u1"));

        let structured: ChatPayload = from_value(json!({
            "sessionId": "s",
            "message": { "id": "m1", "role": "assistant", "content": "hello" }
        }))
        .expect("decode");
        assert!(matches!(structured.message, Some(ChatBody::Entry(_))));
    }

    #[test]
    fn test_chat_typing() {
        let typing: ChatPayload =
            from_value(json!({ "sessionId": "s", "isTyping": true, "userId": "u" })).expect("decode");
        assert_eq!(typing.is_typing, Some(true));
        assert!(typing.message.is_none());
    }

    #[test]
    fn test_notification_and_alert() {
        let note: NotificationPayload = from_value(json!({
            "id": "n1",
            "type": "success",
            "title": "Done",
            "message": "Dataset ready",
            "expiresAt": "2030-01-01T00:00:00Z"
        }))
        .expect("decode");
        assert_eq!(note.kind.as_deref(), Some("success"));
        assert!(note.expires_at.is_some());

        let alert: SystemAlert =
            from_value(json!({ "level": "warning", "message": "maintenance" })).expect("decode");
        assert_eq!(alert.level, AlertLevel::Warning);
    }
}
