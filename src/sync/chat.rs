//! Chat transcripts and typing indicators fed by `chat_message` pushes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::identifiers::Topic;
use crate::protocol::{ChatEntry, ChatPayload};
use crate::router::SubscriptionRegistry;

use super::{Handles, Revision};

// ============================================================================
// ChatSession
// ============================================================================

/// Transcript and typing state of one open session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSession {
    /// Messages in arrival order.
    pub messages: Vec<ChatEntry>,
    /// Users currently typing.
    pub typing: FxHashSet<String>,
}

impl ChatSession {
    fn apply(&mut self, payload: ChatPayload) -> bool {
        let mut changed = false;

        if let (Some(is_typing), Some(user)) = (payload.is_typing, payload.user_id.as_ref()) {
            changed |= if is_typing {
                self.typing.insert(user.clone())
            } else {
                self.typing.remove(user)
            };
        }

        if let Some(body) = payload.message {
            let entry = body.into_entry(payload.user_id);
            // A message from a user ends their typing indicator.
            if let Some(user) = &entry.user_id {
                self.typing.remove(user);
            }
            self.messages.push(entry);
            changed = true;
        }

        changed
    }
}

// ============================================================================
// ChatSessions
// ============================================================================

struct Shared {
    registry: SubscriptionRegistry,
    sessions: Mutex<FxHashMap<String, ChatSession>>,
    handles: Handles,
    revision: Revision,
}

/// Open chat sessions, one `chat_{id}` registration each.
#[derive(Clone)]
pub struct ChatSessions {
    shared: Arc<Shared>,
}

impl fmt::Debug for ChatSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSessions")
            .field("open", &self.shared.handles.len())
            .finish()
    }
}

impl ChatSessions {
    /// Creates an empty session set listening on `registry`.
    #[must_use]
    pub fn new(registry: &SubscriptionRegistry) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: registry.clone(),
                sessions: Mutex::new(FxHashMap::default()),
                handles: Handles::default(),
                revision: Revision::new(),
            }),
        }
    }

    /// Starts following `session_id`. No-op if already open.
    pub fn open(&self, session_id: &str) {
        let weak = Arc::downgrade(&self.shared);
        let key = session_id.to_string();

        let opened = self.shared.handles.insert_with(session_id, || {
            self.shared
                .registry
                .subscribe(Topic::chat(session_id), move |data: &Value| {
                    on_chat(&weak, &key, data);
                })
        });

        if opened {
            self.shared
                .sessions
                .lock()
                .entry(session_id.to_string())
                .or_default();
            debug!(session = session_id, "Chat session opened");
            self.shared.revision.bump();
        }
    }

    /// Stops following `session_id` and drops its transcript.
    pub fn close(&self, session_id: &str) -> Option<ChatSession> {
        self.shared.handles.remove(session_id);
        let removed = self.shared.sessions.lock().remove(session_id);
        if removed.is_some() {
            debug!(session = session_id, "Chat session closed");
            self.shared.revision.bump();
        }
        removed
    }

    /// Returns `true` while `session_id` is open.
    #[must_use]
    pub fn is_open(&self, session_id: &str) -> bool {
        self.shared.handles.contains(session_id)
    }

    /// Returns the messages received for `session_id`.
    #[must_use]
    pub fn transcript(&self, session_id: &str) -> Vec<ChatEntry> {
        self.shared
            .sessions
            .lock()
            .get(session_id)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    /// Returns the users typing in `session_id`, sorted.
    #[must_use]
    pub fn typing_users(&self, session_id: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .shared
            .sessions
            .lock()
            .get(session_id)
            .map(|session| session.typing.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Returns a snapshot of one session.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<ChatSession> {
        self.shared.sessions.lock().get(session_id).cloned()
    }

    /// Returns a receiver that changes after every update.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.watch()
    }
}

fn on_chat(shared: &Weak<Shared>, session_id: &str, data: &Value) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let payload: ChatPayload = match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(session = session_id, error = %e, "Malformed chat payload");
            return;
        }
    };

    let changed = shared
        .sessions
        .lock()
        .get_mut(session_id)
        .is_some_and(|session| session.apply(payload));

    if changed {
        trace!(session = session_id, "Chat session updated");
        shared.revision.bump();
    }
}

// ============================================================================
// Tests
// ============================================================================
