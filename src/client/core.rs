//! Real-time client: connection lifecycle, reconnection and outbound sends.
//!
//! # Link Task
//!
//! Each `connect` spawns one tokio task that opens the transport and then
//! consumes its events in order:
//!
//! - open → `Open`, attempts reset, heartbeat started, `connection` emitted
//! - message → parsed and routed; malformed frames are logged and dropped
//! - error → `error` emitted; the link stays as it is
//! - close → `Disconnected`, heartbeat stopped, `connection` emitted, and a
//!   reconnect scheduled when the closure was abnormal
//!
//! Listeners are always invoked with the state lock released, so they may
//! call back into the client.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, Topic};
use crate::protocol::{InboundMessage, OutboundMessage};
use crate::router::{Subscription, SubscriptionRegistry, TopicRouter};
use crate::transport::{CloseInfo, Frame, Transport, TransportEvent, TransportLink};

use super::builder::{ClientBuilder, ClientConfig};
use super::heartbeat;
use super::state::{ClientState, ConnectionState, ReconnectState};

// ============================================================================
// Constants
// ============================================================================

/// Query parameter carrying the bearer token in the handshake URL.
const TOKEN_PARAM: &str = "token";

/// Reason sent with a deliberate close.
const DISCONNECT_REASON: &str = "Client disconnect";

/// Message published on the `error` topic for transport failures.
const TRANSPORT_ERROR_MESSAGE: &str = "WebSocket connection error";

// ============================================================================
// Types
// ============================================================================

/// What the link task should do once the transport has opened.
enum OpenOutcome {
    /// Link is live.
    Opened,
    /// `disconnect()` ran during the handshake; close the link.
    Closing,
    /// A later `connect()` replaced this link; drop it silently.
    Stale,
}

/// Reconnect scheduled by a close, reported after the lock is released.
struct ScheduledReconnect {
    attempt: u32,
    delay: Duration,
}

// ============================================================================
// ClientInner
// ============================================================================

/// Shared state behind every [`RealtimeClient`] clone.
pub(crate) struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    router: TopicRouter,
    pub(crate) state: Mutex<ClientState>,
}

impl ClientInner {
    /// Appends the token to the configured endpoint.
    fn handshake_url(&self, token: &str) -> Url {
        let mut url = self.config.url.clone();
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
        url
    }

    /// Emits a client-generated event on one of the internal topics.
    fn emit(&self, topic: &str, data: &Value) {
        self.router.registry().emit(topic, data);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts a connection attempt unless one is open or in flight.
    fn connect(self: &Arc<Self>, token: String, explicit: bool) {
        let (generation, url) = {
            let mut state = self.state.lock();

            if matches!(
                state.connection,
                ConnectionState::Open | ConnectionState::Connecting
            ) {
                debug!(state = %state.connection, "Connect ignored, already active");
                return;
            }

            state.cancel_reconnect();
            if explicit {
                state.reconnect.attempt_count = 0;
            }

            state.generation += 1;
            let generation = state.generation;
            let url = self.handshake_url(&token);

            state.link_id = Some(generation);
            state.connection = ConnectionState::Connecting;
            state.reconnect.is_connecting = true;
            state.token = Some(token);

            (generation, url)
        };

        info!(
            generation,
            host = url.host_str(),
            "Connecting to real-time endpoint"
        );

        tokio::spawn(Arc::clone(self).run_link(generation, url));
    }

    /// Closes the link deliberately and cancels every pending timer.
    fn disconnect(&self) {
        let outgoing = {
            let mut state = self.state.lock();

            state.generation += 1;
            state.cancel_reconnect();
            state.stop_heartbeat();
            state.reconnect.is_connecting = false;

            match state.connection {
                ConnectionState::Disconnected | ConnectionState::Closing => {
                    debug!("Disconnect ignored, nothing to close");
                    return;
                }
                ConnectionState::Connecting => {
                    state.connection = ConnectionState::Closing;
                    None
                }
                ConnectionState::Open => {
                    state.connection = ConnectionState::Closing;
                    state.outgoing.take()
                }
            }
        };

        info!("Disconnecting");

        if let Some(outgoing) = outgoing
            && outgoing
                .send(Frame::Close(CloseInfo::normal(DISCONNECT_REASON)))
                .is_err()
        {
            debug!("Link already gone during disconnect");
        }
    }

    /// Writes a message to the open link, or warns and drops it.
    pub(crate) fn send(&self, kind: &str, data: Value) -> bool {
        match self.try_send(kind, data) {
            Ok(id) => {
                trace!(kind, %id, "Message sent");
                true
            }
            Err(Error::ConnectionClosed) => {
                warn!(kind, "WebSocket is not connected, message dropped");
                false
            }
            Err(e) => {
                warn!(kind, error = %e, "Failed to send message");
                false
            }
        }
    }

    fn try_send(&self, kind: &str, data: Value) -> Result<MessageId> {
        let outgoing = {
            let state = self.state.lock();
            match state.connection {
                ConnectionState::Open => state.outgoing.clone(),
                _ => None,
            }
        }
        .ok_or(Error::ConnectionClosed)?;

        let message = OutboundMessage::new(kind, data);
        outgoing
            .send(Frame::Text(message.to_json()?))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(message.id)
    }

    // ========================================================================
    // Link Task
    // ========================================================================

    /// Opens the transport and feeds its events to the handlers.
    async fn run_link(self: Arc<Self>, generation: u64, url: Url) {
        let link = match self.transport.connect(&url).await {
            Ok(link) => link,
            Err(e) => {
                warn!(generation, error = %e, "Transport failed to open");
                self.handle_error(generation, &e.to_string());
                self.handle_close(generation, CloseInfo::abnormal(e.to_string()));
                return;
            }
        };

        let TransportLink {
            outgoing,
            mut incoming,
        } = link;

        match self.handle_open(generation, outgoing.clone()) {
            OpenOutcome::Opened => {}
            OpenOutcome::Closing => {
                let _ = outgoing.send(Frame::Close(CloseInfo::normal(DISCONNECT_REASON)));
            }
            OpenOutcome::Stale => {
                debug!(generation, "Dropping superseded link");
                let _ = outgoing.send(Frame::Close(CloseInfo::normal("Superseded")));
                return;
            }
        }
        drop(outgoing);

        while let Some(event) = incoming.recv().await {
            match event {
                TransportEvent::Message(text) => self.handle_message(generation, &text),
                TransportEvent::Error(detail) => self.handle_error(generation, &detail),
                TransportEvent::Closed(info) => {
                    self.handle_close(generation, info);
                    return;
                }
            }
        }

        self.handle_close(generation, CloseInfo::abnormal("transport ended"));
    }

    fn handle_open(
        self: &Arc<Self>,
        generation: u64,
        outgoing: mpsc::UnboundedSender<Frame>,
    ) -> OpenOutcome {
        {
            let mut state = self.state.lock();

            if state.link_id != Some(generation) {
                return OpenOutcome::Stale;
            }
            if state.connection == ConnectionState::Closing {
                return OpenOutcome::Closing;
            }

            state.connection = ConnectionState::Open;
            state.reconnect = ReconnectState::default();
            state.outgoing = Some(outgoing);
            state.stop_heartbeat();
            state.heartbeat = Some(heartbeat::spawn(
                Arc::downgrade(self),
                generation,
                self.config.heartbeat_interval,
            ));
        }

        info!(generation, "Real-time connection open");
        self.emit(Topic::CONNECTION, &json!({ "status": "connected" }));
        OpenOutcome::Opened
    }

    fn handle_message(&self, generation: u64, text: &str) {
        if !self.state.lock().is_open_generation(generation) {
            trace!(generation, "Message from inactive link ignored");
            return;
        }

        match InboundMessage::parse(text) {
            Ok(message) => {
                self.router.dispatch(&message);
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Failed to parse inbound message");
            }
        }
    }

    fn handle_error(&self, generation: u64, detail: &str) {
        if self.state.lock().link_id != Some(generation) {
            return;
        }

        error!(generation, detail, "WebSocket error");
        self.emit(
            Topic::ERROR,
            &json!({ "message": TRANSPORT_ERROR_MESSAGE, "detail": detail }),
        );
    }

    fn handle_close(self: &Arc<Self>, generation: u64, info: CloseInfo) {
        let (deliberate, scheduled) = {
            let mut state = self.state.lock();

            if state.link_id != Some(generation) {
                debug!(generation, code = info.code, "Close from inactive link ignored");
                return;
            }

            let deliberate = state.connection == ConnectionState::Closing || info.is_normal();

            state.link_id = None;
            state.outgoing = None;
            state.stop_heartbeat();
            state.connection = ConnectionState::Disconnected;
            state.reconnect.is_connecting = false;

            let scheduled = if deliberate
                || state.token.is_none()
                || !self.config.reconnect.allows(state.reconnect.attempt_count)
            {
                None
            } else {
                let attempt = state.reconnect.attempt_count;
                let delay = self.config.reconnect.delay_for(attempt);
                state.reconnect.attempt_count += 1;

                state.cancel_reconnect();
                state.reconnect_timer = Some(spawn_reconnect(
                    Arc::downgrade(self),
                    state.generation,
                    delay,
                ));

                Some(ScheduledReconnect {
                    attempt: attempt + 1,
                    delay,
                })
            };

            (deliberate, scheduled)
        };

        info!(
            code = info.code,
            reason = %info.reason,
            deliberate,
            will_reconnect = scheduled.is_some(),
            "Real-time connection closed"
        );

        self.emit(
            Topic::CONNECTION,
            &json!({
                "status": "disconnected",
                "code": info.code,
                "reason": info.reason,
                "willReconnect": scheduled.is_some(),
            }),
        );

        match scheduled {
            Some(ScheduledReconnect { attempt, delay }) => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.emit(
                    Topic::RECONNECTING,
                    &json!({ "attempt": attempt, "delayMs": delay.as_millis() as u64 }),
                );
            }
            None if !deliberate => {
                warn!(
                    attempts = self.state.lock().reconnect.attempt_count,
                    "Reconnect attempts exhausted, staying disconnected"
                );
            }
            None => {}
        }
    }

    /// Runs a scheduled reconnect if nothing has superseded it.
    fn fire_reconnect(self: &Arc<Self>, generation: u64) {
        let token = {
            let mut state = self.state.lock();

            if state.generation != generation
                || state.connection != ConnectionState::Disconnected
            {
                debug!(generation, "Stale reconnect timer ignored");
                return;
            }

            // Release our own handle so connect() does not abort this task.
            let _ = state.reconnect_timer.take();
            state.token.clone()
        };

        if let Some(token) = token {
            debug!(generation, "Reconnect timer fired");
            self.connect(token, false);
        }
    }
}

/// Spawns the single-shot reconnect timer.
fn spawn_reconnect(inner: Weak<ClientInner>, generation: u64, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = inner.upgrade() {
            inner.fire_reconnect(generation);
        }
    })
}

// ============================================================================
// RealtimeClient
// ============================================================================

/// Handle to the single real-time connection.
///
/// Clones share one connection and one subscription registry. All
/// operations return immediately; outcomes are reported on the
/// `connection`, `reconnecting` and `error` topics.
///
/// The connection is not closed on drop. Call
/// [`disconnect`](Self::disconnect) to shut it down.
///
/// # Example
///
/// ```no_run
/// use docstream_realtime::RealtimeClient;
///
/// # async fn example() -> docstream_realtime::Result<()> {
/// let client = RealtimeClient::builder()
///     .url("wss://api.example.com/ws")
///     .build()?;
///
/// let progress = client.subscribe_to_job_progress("job-1", |data| {
///     println!("progress: {}", data["progress"]);
/// });
///
/// client.connect("bearer-token");
/// // ...
/// progress.unsubscribe();
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &state.connection)
            .field("attempts", &state.reconnect.attempt_count)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RealtimeClient - Constructor
// ============================================================================

impl RealtimeClient {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        registry: SubscriptionRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                router: TopicRouter::new(registry),
                state: Mutex::new(ClientState::default()),
            }),
        }
    }
}

// ============================================================================
// RealtimeClient - Connection
// ============================================================================

impl RealtimeClient {
    /// Opens the connection with `token`.
    ///
    /// No-op while `Open` or `Connecting`. Cancels any pending reconnect and
    /// starts a fresh retry budget. Must be called from within a tokio
    /// runtime.
    pub fn connect(&self, token: impl Into<String>) {
        self.inner.connect(token.into(), true);
    }

    /// Closes the connection deliberately. No reconnect follows.
    ///
    /// Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Returns `true` while the connection is `Open`.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    /// Returns the number of reconnect attempts since the last open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect.attempt_count
    }

    /// Returns `true` while a handshake is in flight.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.inner.state.lock().reconnect.is_connecting
    }
}

// ============================================================================
// RealtimeClient - Outbound
// ============================================================================

impl RealtimeClient {
    /// Sends `{type: kind, data}` if the connection is open.
    ///
    /// Returns `false` (and logs a warning) when the message was dropped.
    /// There is no queue and no retry.
    pub fn send(&self, kind: &str, data: Value) -> bool {
        self.inner.send(kind, data)
    }

    /// Asks the server to push updates for a job.
    pub fn request_job_updates(&self, job_id: &str) -> bool {
        self.send(
            "subscribe",
            json!({ "subscription_type": "job", "target_id": job_id }),
        )
    }

    /// Asks the server to push messages for a chat session.
    pub fn request_chat_updates(&self, session_id: &str) -> bool {
        self.send(
            "subscribe",
            json!({ "subscription_type": "chat", "target_id": session_id }),
        )
    }

    /// Publishes a typing indicator for a chat session.
    pub fn send_typing(&self, session_id: &str, is_typing: bool) -> bool {
        self.send(
            "typing_indicator",
            json!({ "session_id": session_id, "is_typing": is_typing }),
        )
    }
}

// ============================================================================
// RealtimeClient - Subscriptions
// ============================================================================

impl RealtimeClient {
    /// Registers `callback` on `topic`.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry().subscribe(topic, callback)
    }

    /// Registers `callback` for progress of one job.
    pub fn subscribe_to_job_progress<F>(&self, job_id: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Topic::job_progress(job_id), callback)
    }

    /// Registers `callback` for messages of one chat session.
    pub fn subscribe_to_chat_messages<F>(&self, session_id: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Topic::chat(session_id), callback)
    }

    /// Registers `callback` for user notifications.
    pub fn subscribe_to_notifications<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Topic::notification(), callback)
    }

    /// Registers `callback` for system alerts.
    pub fn subscribe_to_system_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Topic::system_alert(), callback)
    }

    /// Registers `callback` for connection lifecycle events.
    pub fn subscribe_to_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Topic::connection(), callback)
    }

    /// Returns the registry shared by this client.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        self.inner.router.registry()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::{Instant, timeout};

    use crate::client::ReconnectPolicy;
    use crate::transport::mock::{MockPeer, MockTransport};

    const WAIT: Duration = Duration::from_secs(120);

    fn client_with(
        policy: ReconnectPolicy,
    ) -> (
        RealtimeClient,
        Arc<MockTransport>,
        mpsc::UnboundedReceiver<MockPeer>,
    ) {
        let (transport, peers) = MockTransport::new();
        let client = RealtimeClient::builder()
            .url("ws://localhost:8000/ws")
            .reconnect_policy(policy)
            .transport(transport.clone())
            .build()
            .expect("client");
        (client, transport, peers)
    }

    /// Collects every payload emitted on `topic` into a channel.
    fn record(
        client: &RealtimeClient,
        topic: &str,
    ) -> (Subscription, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = client.subscribe(topic, move |data: &Value| {
            let _ = tx.send(data.clone());
        });
        (sub, rx)
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    async fn open(
        client: &RealtimeClient,
        peers: &mut mpsc::UnboundedReceiver<MockPeer>,
    ) -> MockPeer {
        let (_sub, mut events) = record(client, Topic::CONNECTION);
        client.connect("secret");
        let peer = next(peers).await;
        assert_eq!(next(&mut events).await["status"], "connected");
        peer
    }

    #[tokio::test]
    async fn test_connect_embeds_token() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let peer = open(&client, &mut peers).await;

        assert_eq!(peer.url.as_str(), "ws://localhost:8000/ws?token=secret");
        assert!(client.is_connected());
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_connect_is_noop_when_open() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let _peer = open(&client, &mut peers).await;

        client.connect("secret");
        client.connect("other");
        tokio::task::yield_now().await;

        assert_eq!(transport.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_inbound_routed_to_job_topic() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut updates) = {
            let (tx, rx) = mpsc::unbounded_channel();
            let sub = client.subscribe_to_job_progress("job-1", move |data: &Value| {
                let _ = tx.send(data.clone());
            });
            (sub, rx)
        };
        let peer = open(&client, &mut peers).await;

        peer.push_text(
            r#"{"type":"job_progress","data":{"jobId":"job-1","status":"processing","progress":42},"timestamp":"2024-05-01T00:00:00Z","id":"a"}"#,
        );

        assert_eq!(
            next(&mut updates).await,
            json!({ "jobId": "job-1", "status": "processing", "progress": 42 })
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut alerts) = record(&client, Topic::SYSTEM_ALERT);
        let peer = open(&client, &mut peers).await;

        peer.push_text("{not json");
        peer.push_text(r#"{"type":"system_alert","data":{"level":"info","message":"ok"}}"#);

        assert_eq!(next(&mut alerts).await["message"], "ok");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_drops() {
        let (client, _transport, _peers) = client_with(ReconnectPolicy::new());
        assert!(!client.send("ping", json!({})));
    }

    #[tokio::test]
    async fn test_send_writes_envelope() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let mut peer = open(&client, &mut peers).await;

        assert!(client.request_job_updates("job-7"));

        let Some(Frame::Text(text)) = peer.next_frame().await else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["data"]["target_id"], "job-7");
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_transport_error_emits_without_closing() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut errors) = record(&client, Topic::ERROR);
        let peer = open(&client, &mut peers).await;

        peer.push_error("broken pipe");

        let error = next(&mut errors).await;
        assert_eq!(error["message"], TRANSPORT_ERROR_MESSAGE);
        assert_eq!(error["detail"], "broken pipe");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_suppresses_reconnect() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut events) = record(&client, Topic::CONNECTION);
        let (_rsub, mut reconnecting) = record(&client, Topic::RECONNECTING);
        let mut peer = open(&client, &mut peers).await;
        assert_eq!(next(&mut events).await["status"], "connected");

        client.disconnect();
        client.disconnect();

        assert_eq!(
            peer.next_frame().await,
            Some(Frame::Close(CloseInfo::normal(DISCONNECT_REASON)))
        );

        let closed = next(&mut events).await;
        assert_eq!(closed["status"], "disconnected");
        assert_eq!(closed["willReconnect"], false);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reconnecting.try_recv().is_err());
        assert_eq!(transport.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_server_normal_close_does_not_reconnect() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut events) = record(&client, Topic::CONNECTION);
        let peer = open(&client, &mut peers).await;
        assert_eq!(next(&mut events).await["status"], "connected");

        peer.close(CloseInfo::NORMAL);

        let closed = next(&mut events).await;
        assert_eq!(closed["code"], 1000);
        assert_eq!(closed["willReconnect"], false);
        assert_eq!(client.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_abnormal_closes_backoff() {
        let (client, transport, mut peers) =
            client_with(ReconnectPolicy::new().with_max_attempts(5));
        let (_sub, mut reconnecting) = record(&client, Topic::RECONNECTING);
        let peer = open(&client, &mut peers).await;

        // The first two retries fail, so three closures happen before the
        // next open.
        transport.refuse_next(2);
        peer.close(1006);

        let mut delays = Vec::new();
        for _ in 0..3 {
            delays.push(next(&mut reconnecting).await["delayMs"].as_u64());
        }
        assert_eq!(delays, vec![Some(1000), Some(2000), Some(4000)]);

        let _peer = next(&mut peers).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(reconnecting.try_recv().is_err());
        assert_eq!(transport.attempts().len(), 4);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_without_open() {
        let (client, transport, mut peers) =
            client_with(ReconnectPolicy::new().with_max_attempts(7));
        let (_sub, mut reconnecting) = record(&client, Topic::RECONNECTING);
        let (_csub, mut events) = record(&client, Topic::CONNECTION);

        let peer = open(&client, &mut peers).await;
        assert_eq!(next(&mut events).await["status"], "connected");

        // Every reconnect attempt is refused, so no open intervenes.
        transport.refuse_next(usize::MAX);
        peer.close(1006);

        let mut schedule = Vec::new();
        for _ in 0..7 {
            let scheduled = next(&mut reconnecting).await;
            schedule.push((
                scheduled["attempt"].as_u64().expect("attempt"),
                scheduled["delayMs"].as_u64().expect("delay"),
            ));
        }

        assert_eq!(
            schedule,
            vec![
                (1, 1000),
                (2, 2000),
                (3, 4000),
                (4, 8000),
                (5, 16000),
                (6, 30000),
                (7, 30000),
            ]
        );

        // The seventh reconnect fails and the ceiling is reached.
        loop {
            let event = next(&mut events).await;
            if event["willReconnect"] == false {
                break;
            }
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(reconnecting.try_recv().is_err());
        assert_eq!(transport.attempts().len(), 8);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.reconnect_attempts(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_delay() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let peer = open(&client, &mut peers).await;

        transport.refuse_next(1);
        let closed_at = Instant::now();
        peer.close(1006);

        // First retry (1s) is refused, second (2s later) succeeds.
        let _peer = next(&mut peers).await;
        let elapsed = closed_at.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
        assert_eq!(transport.attempts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_attempts() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut reconnecting) = record(&client, Topic::RECONNECTING);
        let (_csub, mut events) = record(&client, Topic::CONNECTION);
        let peer = open(&client, &mut peers).await;
        assert_eq!(next(&mut events).await["status"], "connected");

        transport.refuse_next(2);
        peer.close(1006);

        for expected in [1000, 2000, 4000] {
            assert_eq!(next(&mut reconnecting).await["delayMs"], expected);
        }

        let peer = next(&mut peers).await;
        loop {
            if next(&mut events).await["status"] == "connected" {
                break;
            }
        }
        assert_eq!(client.reconnect_attempts(), 0);

        peer.close(1006);
        assert_eq!(next(&mut reconnecting).await["delayMs"], 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut reconnecting) = record(&client, Topic::RECONNECTING);
        let peer = open(&client, &mut peers).await;

        peer.close(1006);
        assert_eq!(next(&mut reconnecting).await["delayMs"], 1000);

        client.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.attempts().len(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_while_open() {
        let (transport, mut peers) = MockTransport::new();
        let client = RealtimeClient::builder()
            .url("ws://localhost/ws")
            .heartbeat_interval(Duration::from_secs(30))
            .transport(transport)
            .build()
            .expect("client");
        let mut peer = open(&client, &mut peers).await;

        let opened = Instant::now();
        let Some(Frame::Text(text)) = peer.next_frame().await else {
            panic!("expected ping");
        };
        assert!(opened.elapsed() >= Duration::from_secs(30));

        let ping: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(ping["type"], "ping");
        assert!(ping["data"]["timestamp"].is_string());

        client.disconnect();
        assert!(matches!(peer.next_frame().await, Some(Frame::Close(_))));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(peer.try_frame().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_on_server_close() {
        let (transport, mut peers) = MockTransport::new();
        let client = RealtimeClient::builder()
            .url("ws://localhost/ws")
            .heartbeat_interval(Duration::from_secs(30))
            .reconnect_policy(ReconnectPolicy::disabled())
            .transport(transport.clone())
            .build()
            .expect("client");
        let (_sub, mut events) = record(&client, Topic::CONNECTION);
        let mut peer = open(&client, &mut peers).await;
        assert_eq!(next(&mut events).await["status"], "connected");

        peer.push_error("reset by peer");
        peer.close(1006);
        let closed = next(&mut events).await;
        assert_eq!(closed["code"], 1006);
        assert_eq!(closed["willReconnect"], false);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(peer.try_frame().is_none());
        assert_eq!(transport.attempts().len(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_reconnect_timer_pending() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut reconnecting) = record(&client, Topic::RECONNECTING);
        let first = open(&client, &mut peers).await;

        first.close(1006);
        first.close(1006);
        assert_eq!(next(&mut reconnecting).await["attempt"], 1);

        // An explicit connect replaces the pending timer.
        let second = open(&client, &mut peers).await;
        second.close(1006);
        assert_eq!(next(&mut reconnecting).await["attempt"], 1);

        let _third = next(&mut peers).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(reconnecting.try_recv().is_err());
        assert!(peers.try_recv().is_err());
        assert_eq!(transport.attempts().len(), 3);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_during_handshake() {
        let (client, transport, mut peers) = client_with(ReconnectPolicy::new());
        let (_sub, mut events) = record(&client, Topic::CONNECTION);

        client.connect("secret");
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Closing);

        let mut peer = next(&mut peers).await;
        assert!(matches!(peer.next_frame().await, Some(Frame::Close(_))));

        let closed = next(&mut events).await;
        assert_eq!(closed["status"], "disconnected");
        assert_eq!(closed["willReconnect"], false);
        assert_eq!(transport.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_listener_may_call_back_into_client() {
        let (client, _transport, mut peers) = client_with(ReconnectPolicy::new());
        let echo = client.clone();
        let _sub = client.subscribe_to_connection(move |data: &Value| {
            if data["status"] == "connected" {
                echo.send("hello", json!({}));
            }
        });

        let mut peer = open(&client, &mut peers).await;
        let Some(Frame::Text(text)) = peer.next_frame().await else {
            panic!("expected hello");
        };
        assert!(text.contains(r#""type":"hello""#));
    }
}
