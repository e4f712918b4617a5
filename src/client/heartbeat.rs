//! Liveness ping while the connection is open.
//!
//! The first ping goes out one interval after open. Absence of a reply is
//! not tracked; reconnection is driven only by transport close events.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

use crate::protocol::now_timestamp;

use super::core::ClientInner;

// ============================================================================
// Constants
// ============================================================================

/// Outbound type of the heartbeat message.
pub const PING: &str = "ping";

// ============================================================================
// Heartbeat
// ============================================================================

/// Spawns the ping loop for the link opened at `generation`.
///
/// The task exits on its own once the generation moves on or the client
/// is dropped; callers also abort it on close.
pub(crate) fn spawn(inner: Weak<ClientInner>, generation: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(inner) = inner.upgrade() else {
                break;
            };

            if !inner.state.lock().is_open_generation(generation) {
                debug!(generation, "Heartbeat stopped, link superseded");
                break;
            }

            trace!(generation, "Sending heartbeat");
            inner.send(PING, json!({ "timestamp": now_timestamp() }));
        }
    })
}
