//! Topic → listener bookkeeping.
//!
//! The registry is the only owner of the topic map. Topics appear on first
//! [`subscribe`](SubscriptionRegistry::subscribe) and are removed as soon as
//! their last listener goes away, so a long session that follows thousands
//! of jobs does not accumulate empty entries.
//!
//! # Delivery
//!
//! [`emit`](SubscriptionRegistry::emit) snapshots the listener list, drops
//! the lock, then calls each listener in registration order. Listeners may
//! therefore subscribe or unsubscribe from inside a callback. A listener
//! that panics is logged and skipped; the others still run.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::identifiers::{ListenerId, Topic};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the `data` of every message routed to its topic.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// One registered callback.
struct Registration {
    id: ListenerId,
    /// Shared with the [`Subscription`]; cleared the moment it unsubscribes.
    active: Arc<AtomicBool>,
    listener: Listener,
}

/// Map of topic keys to their registrations, in insertion order.
type ListenerMap = FxHashMap<Topic, Vec<Registration>>;

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Maps topics to the callbacks registered for them.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    topics: Arc<Mutex<ListenerMap>>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topic_count())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `topic`.
    ///
    /// The same closure may be registered several times; each registration
    /// gets its own handle and is delivered to independently.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = ListenerId::next();
        let active = Arc::new(AtomicBool::new(true));

        {
            let mut topics = self.topics.lock();
            topics.entry(topic.clone()).or_default().push(Registration {
                id,
                active: Arc::clone(&active),
                listener: Arc::new(callback),
            });
        }

        debug!(topic = %topic, listener = %id, "Listener subscribed");

        Subscription {
            topic,
            id,
            active,
            topics: Arc::downgrade(&self.topics),
        }
    }

    /// Delivers `data` to every listener currently registered on `topic`.
    ///
    /// Returns the number of listeners that ran to completion.
    pub fn emit(&self, topic: &str, data: &Value) -> usize {
        let snapshot: Vec<(ListenerId, Arc<AtomicBool>, Listener)> = {
            let topics = self.topics.lock();
            match topics.get(topic) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| (r.id, Arc::clone(&r.active), Arc::clone(&r.listener)))
                    .collect(),
                None => {
                    trace!(topic, "No listeners for topic");
                    return 0;
                }
            }
        };

        let mut delivered = 0;

        for (id, active, listener) in snapshot {
            // Unsubscribed by an earlier listener during this emit.
            if !active.load(Ordering::Acquire) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| listener(data))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        topic,
                        listener = %id,
                        panic = panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        }

        trace!(topic, delivered, "Emitted");
        delivered
    }

    /// Returns the number of topics with at least one listener.
    #[inline]
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    /// Returns the number of listeners registered on `topic`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, Vec::len)
    }

    /// Returns `true` if `topic` has at least one listener.
    #[inline]
    #[must_use]
    pub fn has_listeners(&self, topic: &str) -> bool {
        self.topics.lock().contains_key(topic)
    }

    /// Drops every registration. Outstanding handles become inert.
    pub fn clear(&self) {
        let drained: Vec<_> = self.topics.lock().drain().collect();
        for (_, registrations) in &drained {
            for registration in registrations {
                registration.active.store(false, Ordering::Release);
            }
        }
        debug!(topics = drained.len(), "Registry cleared");
    }
}

/// Removes one registration, deleting the topic when it becomes empty.
fn remove_listener(topics: &Mutex<ListenerMap>, topic: &Topic, id: ListenerId) -> bool {
    let mut topics = topics.lock();

    let Some(registrations) = topics.get_mut(topic) else {
        return false;
    };

    let before = registrations.len();
    registrations.retain(|r| r.id != id);
    let removed = registrations.len() != before;

    if registrations.is_empty() {
        topics.remove(topic);
        debug!(topic = %topic, "Topic removed");
    }

    removed
}

/// Extracts the message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle for one registration, returned by
/// [`SubscriptionRegistry::subscribe`].
///
/// Dropping the handle does **not** unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). The handle holds only a weak
/// reference to the registry.
#[must_use = "dropping a Subscription leaves the listener registered"]
pub struct Subscription {
    topic: Topic,
    id: ListenerId,
    active: Arc<AtomicBool>,
    topics: Weak<Mutex<ListenerMap>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Removes exactly this registration.
    ///
    /// Calls after the first are no-ops.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(topics) = self.topics.upgrade() {
            remove_listener(&topics, &self.topic, self.id);
        }

        debug!(topic = %self.topic, listener = %self.id, "Listener unsubscribed");
    }

    /// Returns `true` until the handle has been used or the registry cleared.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the topic this handle is bound to.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Returns the listener id this handle is bound to.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

// ============================================================================
// Tests
// ============================================================================
