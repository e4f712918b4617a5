//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use docstream_realtime::{RealtimeClient, ReconnectPolicy};
//!
//! # fn example() -> docstream_realtime::Result<()> {
//! let client = RealtimeClient::builder()
//!     .url("wss://api.example.com/ws")
//!     .heartbeat_interval(Duration::from_secs(15))
//!     .reconnect_policy(ReconnectPolicy::new().with_max_attempts(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::router::SubscriptionRegistry;
use crate::transport::{Transport, WebSocketTransport};

use super::core::RealtimeClient;
use super::policy::ReconnectPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint used when none is configured.
pub const DEFAULT_URL: &str = "ws://localhost:8000/ws";

/// Interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// ClientConfig
// ============================================================================

/// Validated settings shared by the client and its tasks.
#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub url: Url,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for a [`RealtimeClient`].
///
/// Use [`RealtimeClient::builder()`] to create one.
#[derive(Clone, Default)]
pub struct ClientBuilder {
    /// Endpoint without the token parameter.
    url: Option<String>,
    heartbeat_interval: Option<Duration>,
    reconnect: ReconnectPolicy,
    transport: Option<Arc<dyn Transport>>,
    registry: Option<SubscriptionRegistry>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("url", &self.url)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect", &self.reconnect)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` URL; the token is appended on connect
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the heartbeat interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Replaces the WebSocket transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares an existing subscription registry with the client.
    #[inline]
    #[must_use]
    pub fn registry(mut self, registry: SubscriptionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::InvalidUrl`] if the URL is not `ws`/`wss` or already
    ///   carries a `token` parameter
    /// - [`Error::Config`] if the heartbeat interval is zero or the
    ///   reconnect policy is inconsistent
    pub fn build(self) -> Result<RealtimeClient> {
        let config = self.validate()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        Ok(RealtimeClient::new(
            config,
            transport,
            self.registry.unwrap_or_default(),
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    fn validate(&self) -> Result<ClientConfig> {
        let url = self.validate_url()?;

        let heartbeat_interval = self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        if heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat interval must be greater than zero"));
        }

        self.reconnect.validate()?;

        Ok(ClientConfig {
            url,
            heartbeat_interval,
            reconnect: self.reconnect,
        })
    }

    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().unwrap_or(DEFAULT_URL);
        let url = Url::parse(raw)?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::invalid_url(
                    raw,
                    format!("unsupported scheme '{other}', expected ws or wss"),
                ));
            }
        }

        if url.query_pairs().any(|(key, _)| key == "token") {
            return Err(Error::invalid_url(
                raw,
                "token is supplied by connect(), remove it from the URL",
            ));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
