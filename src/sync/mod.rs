//! Domain synchronizers: local caches kept current by server pushes.
//!
//! Each synchronizer registers on the shared
//! [`SubscriptionRegistry`](crate::router::SubscriptionRegistry),
//! decodes the raw payloads into [`crate::protocol`] types and publishes a
//! revision number on a `tokio::sync::watch` channel after every change.
//!
//! | Type | Topics |
//! |------|--------|
//! | [`JobTracker`] | `job_progress_{jobId}` per tracked job |
//! | [`ChatSessions`] | `chat_{sessionId}` per open session |
//! | [`NotificationCenter`] | `notification`, `system_alert` |
//! | [`ConnectionMonitor`] | `connection`, `reconnecting`, `error` |
//!
//! Callbacks hold only a weak reference to the synchronizer, so dropping it
//! silences its listeners even if the handles were never released.

// ============================================================================
// Submodules
// ============================================================================

/// Chat transcripts and typing indicators.
pub mod chat;

/// Processing job cache.
pub mod jobs;

/// Connection quality.
pub mod monitor;

/// Notifications and system alerts.
pub mod notifications;

// ============================================================================
// Re-exports
// ============================================================================

pub use chat::{ChatSession, ChatSessions};
pub use jobs::{JobTracker, ProcessingJob};
pub use monitor::{ConnectionMonitor, ConnectionQuality, ConnectionStatus};
pub use notifications::{Notification, NotificationCenter};

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::watch;

use crate::router::Subscription;

// ============================================================================
// Revision
// ============================================================================

/// Monotonic change counter observed through a watch channel.
#[derive(Debug)]
pub(crate) struct Revision {
    tx: watch::Sender<u64>,
}

impl Revision {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Advances the counter and wakes every watcher.
    pub(crate) fn bump(&self) {
        self.tx.send_modify(|revision| *revision += 1);
    }

    pub(crate) fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Subscription handles keyed by entity id, at most one per entity.
#[derive(Debug, Default)]
pub(crate) struct Handles {
    by_key: Mutex<FxHashMap<String, Subscription>>,
}

impl Handles {
    /// Stores the handle returned by `subscribe` unless `key` already has
    /// one. Returns `true` if a new registration was made.
    pub(crate) fn insert_with<F>(&self, key: &str, subscribe: F) -> bool
    where
        F: FnOnce() -> Subscription,
    {
        let mut by_key = self.by_key.lock();
        if by_key.get(key).is_some_and(Subscription::is_active) {
            return false;
        }
        by_key.insert(key.to_string(), subscribe());
        true
    }

    /// Unsubscribes and forgets the handle for `key`.
    pub(crate) fn remove(&self, key: &str) -> bool {
        let removed = self.by_key.lock().remove(key);
        match removed {
            Some(subscription) => {
                subscription.unsubscribe();
                true
            }
            None => false,
        }
    }

    /// Unsubscribes every handle.
    pub(crate) fn clear(&self) {
        let drained: Vec<Subscription> = self
            .by_key
            .lock()
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();
        for subscription in drained {
            subscription.unsubscribe();
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.lock().contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.lock().len()
    }
}

impl Drop for Handles {
    fn drop(&mut self) {
        self.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::router::SubscriptionRegistry;

    #[test]
    fn test_revision_bumps() {
        let revision = Revision::new();
        let mut rx = revision.watch();
        assert_eq!(revision.current(), 0);

        revision.bump();
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn test_handles_register_once() {
        let registry = SubscriptionRegistry::new();
        let handles = Handles::default();

        assert!(handles.insert_with("a", || registry.subscribe("t_a", |_| {})));
        assert!(!handles.insert_with("a", || registry.subscribe("t_a", |_| {})));
        assert_eq!(registry.listener_count("t_a"), 1);

        assert!(handles.remove("a"));
        assert!(!handles.remove("a"));
        assert!(!registry.has_listeners("t_a"));
    }

    #[test]
    fn test_drop_releases_listeners() {
        let registry = SubscriptionRegistry::new();
        {
            let handles = Handles::default();
            handles.insert_with("a", || registry.subscribe("t_a", |_| {}));
            handles.insert_with("b", || registry.subscribe("t_b", |_| {}));
            assert_eq!(registry.topic_count(), 2);
        }
        assert_eq!(registry.topic_count(), 0);
    }
}
