//! Topic routing and subscription bookkeeping.
//!
//! ```text
//! InboundMessage ──► TopicRouter::dispatch ──► topic_for(message)
//!                                                   │
//!                         SubscriptionRegistry::emit(topic, data)
//!                                                   │
//!                               ┌───────────────────┼──────────────────┐
//!                               ▼                   ▼                  ▼
//!                           listener 1          listener 2   ...   listener N
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Topic → listener map and subscription handles |
//! | `route` | Message → topic derivation and dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Subscription registry.
pub mod registry;

/// Topic router.
pub mod route;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::{Listener, Subscription, SubscriptionRegistry};
pub use route::{TopicRouter, topic_for};
