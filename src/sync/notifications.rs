//! User notifications and system alerts.
//!
//! Notifications are kept newest-first with a read flag. System alerts keep
//! only the most recent [`MAX_ALERTS`]. Both honour `expiresAt` through
//! [`NotificationCenter::prune_expired`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::identifiers::Topic;
use crate::protocol::{AlertLevel, NotificationPayload, SystemAlert};
use crate::router::SubscriptionRegistry;

use super::{Handles, Revision};

// ============================================================================
// Constants
// ============================================================================

/// System alerts retained.
pub const MAX_ALERTS: usize = 20;

// ============================================================================
// Notification
// ============================================================================

/// A received notification and its local read state.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Payload as pushed by the server.
    pub payload: NotificationPayload,
    /// Set by `mark_read` or `mark_all_read`.
    pub read: bool,
    /// Local arrival time.
    pub received_at: DateTime<Utc>,
}

impl Notification {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.payload.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inbox {
    notifications: VecDeque<Notification>,
    alerts: VecDeque<SystemAlert>,
}

impl Inbox {
    fn push_notification(&mut self, payload: NotificationPayload) {
        // A repeated id replaces the earlier copy.
        self.notifications.retain(|n| n.payload.id != payload.id);
        self.notifications.push_front(Notification {
            payload,
            read: false,
            received_at: Utc::now(),
        });
    }

    fn push_alert(&mut self, alert: SystemAlert) {
        self.alerts.push_front(alert);
        self.alerts.truncate(MAX_ALERTS);
    }
}

// ============================================================================
// NotificationCenter
// ============================================================================

struct Shared {
    registry: SubscriptionRegistry,
    inbox: Mutex<Inbox>,
    handles: Handles,
    revision: Revision,
}

/// Collects `notification` and `system_alert` pushes.
#[derive(Clone)]
pub struct NotificationCenter {
    shared: Arc<Shared>,
}

impl fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inbox = self.shared.inbox.lock();
        f.debug_struct("NotificationCenter")
            .field("notifications", &inbox.notifications.len())
            .field("alerts", &inbox.alerts.len())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl NotificationCenter {
    /// Creates a detached center. Call [`attach`](Self::attach) to start
    /// receiving.
    #[must_use]
    pub fn new(registry: &SubscriptionRegistry) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: registry.clone(),
                inbox: Mutex::new(Inbox::default()),
                handles: Handles::default(),
                revision: Revision::new(),
            }),
        }
    }

    /// Subscribes to both global topics. Idempotent.
    pub fn attach(&self) {
        let notifications =
            self.listen::<NotificationPayload>(Topic::NOTIFICATION, |inbox, payload| {
                inbox.push_notification(payload);
            });
        let alerts = self.listen::<SystemAlert>(Topic::SYSTEM_ALERT, |inbox, alert| {
            if alert.level >= AlertLevel::Error {
                warn!(level = ?alert.level, text = %alert.message, "System alert");
            } else {
                info!(level = ?alert.level, text = %alert.message, "System alert");
            }
            inbox.push_alert(alert);
        });

        if notifications || alerts {
            debug!("Notification center attached");
        }
    }

    /// Releases both subscriptions. Cached entries are kept.
    pub fn detach(&self) {
        self.shared.handles.clear();
        debug!("Notification center detached");
    }

    /// Returns `true` while subscribed.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.shared.handles.len() > 0
    }

    fn listen<T>(&self, topic: &'static str, apply: fn(&mut Inbox, T)) -> bool
    where
        T: DeserializeOwned + 'static,
    {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.handles.insert_with(topic, || {
            self.shared.registry.subscribe(topic, move |data: &Value| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match serde_json::from_value::<T>(data.clone()) {
                    Ok(payload) => {
                        apply(&mut shared.inbox.lock(), payload);
                        shared.revision.bump();
                    }
                    Err(e) => warn!(topic, error = %e, "Malformed payload"),
                }
            })
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.inbox.lock().notifications.iter().cloned().collect()
    }

    /// Returns the number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.shared
            .inbox
            .lock()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .count()
    }

    /// Returns retained system alerts, newest first.
    #[must_use]
    pub fn alerts(&self) -> Vec<SystemAlert> {
        self.shared.inbox.lock().alerts.iter().cloned().collect()
    }

    /// Returns a receiver that changes after every update.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.watch()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Marks one notification read. Returns `false` if unknown.
    pub fn mark_read(&self, id: &str) -> bool {
        let found = {
            let mut inbox = self.shared.inbox.lock();
            match inbox.notifications.iter_mut().find(|n| n.payload.id == id) {
                Some(notification) => {
                    notification.read = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.shared.revision.bump();
        }
        found
    }

    /// Marks every notification read.
    pub fn mark_all_read(&self) {
        for notification in &mut self.shared.inbox.lock().notifications {
            notification.read = true;
        }
        self.shared.revision.bump();
    }

    /// Removes one notification. Returns `false` if unknown.
    pub fn dismiss(&self, id: &str) -> bool {
        let dismissed = {
            let mut inbox = self.shared.inbox.lock();
            let before = inbox.notifications.len();
            inbox.notifications.retain(|n| n.payload.id != id);
            inbox.notifications.len() != before
        };
        if dismissed {
            self.shared.revision.bump();
        }
        dismissed
    }

    /// Drops notifications and alerts whose `expiresAt` is at or before
    /// `now`. Returns how many entries were removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut inbox = self.shared.inbox.lock();
            let before = inbox.notifications.len() + inbox.alerts.len();
            inbox.notifications.retain(|n| !n.is_expired(now));
            inbox
                .alerts
                .retain(|a| !a.expires_at.is_some_and(|at| at <= now));
            before - inbox.notifications.len() - inbox.alerts.len()
        };
        if removed > 0 {
            debug!(removed, "Pruned expired notifications");
            self.shared.revision.bump();
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
