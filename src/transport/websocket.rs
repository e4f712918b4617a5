//! WebSocket transport and link pump.
//!
//! [`WebSocketTransport::connect`] performs the client handshake with
//! `tokio_tungstenite::connect_async`, then spawns a pump task that owns the
//! stream and bridges it to the link channels:
//!
//! - Text frames from the server become [`TransportEvent::Message`]
//! - [`Frame::Text`] from the client is written as a text frame
//! - [`Frame::Close`] sends a close frame and ends the pump
//! - Server close, read errors and end of stream end the pump with
//!   [`TransportEvent::Closed`]

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{CloseInfo, Frame, Transport, TransportEvent, TransportLink};

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the stream.
type WsWrite = SplitSink<WsStream, Message>;

/// Close code reported when the server closes without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] backed by tokio-tungstenite.
///
/// `wss://` URLs require the `native-tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<TransportLink> {
        let (ws_stream, response) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(WsError::Http(response)) => {
                return Err(Error::connection(format!(
                    "WebSocket handshake rejected with HTTP {}",
                    response.status()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        debug!(host = url.host_str(), status = %response.status(), "WebSocket handshake completed");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();

        tokio::spawn(run_pump(ws_stream, outgoing_rx, incoming_tx));

        Ok(TransportLink { outgoing, incoming })
    }
}

// ============================================================================
// Pump
// ============================================================================

/// Bridges one WebSocket stream to its link channels until either side ends.
async fn run_pump(
    ws_stream: WsStream,
    mut outgoing_rx: mpsc::UnboundedReceiver<Frame>,
    incoming_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let close = loop {
        tokio::select! {
            // Frames from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Frame received");
                        if incoming_tx.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                            debug!("Link receiver dropped");
                            let _ = ws_write.close().await;
                            return;
                        }
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let info = frame.map_or_else(
                            || CloseInfo::new(NO_STATUS_RECEIVED, ""),
                            |f| CloseInfo::new(u16::from(f.code), f.reason.as_str()),
                        );
                        debug!(code = info.code, reason = %info.reason, "WebSocket closed by server");
                        break info;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        let _ = incoming_tx.send(TransportEvent::Error(e.to_string()));
                        break CloseInfo::abnormal(e.to_string());
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break CloseInfo::abnormal("stream ended");
                    }

                    // Ignore Binary, Ping, Pong, Frame
                    _ => {}
                }
            }

            // Frames from the client
            frame = outgoing_rx.recv() => {
                match frame {
                    Some(Frame::Text(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to write frame");
                            let _ = incoming_tx.send(TransportEvent::Error(e.to_string()));
                        }
                    }

                    Some(Frame::Close(info)) => {
                        send_close(&mut ws_write, &info).await;
                        break info;
                    }

                    None => {
                        debug!("Link sender dropped");
                        send_close(&mut ws_write, &CloseInfo::normal("")).await;
                        return;
                    }
                }
            }
        }
    };

    let _ = incoming_tx.send(TransportEvent::Closed(close));
    debug!("Link pump terminated");
}

/// Writes a close frame and flushes the sink.
async fn send_close(ws_write: &mut WsWrite, info: &CloseInfo) {
    let frame = CloseFrame {
        code: CloseCode::from(info.code),
        reason: info.reason.clone().into(),
    };

    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
    let _ = ws_write.close().await;
}

// ============================================================================
// Tests
// ============================================================================
