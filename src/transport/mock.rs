//! In-memory transport for client tests.
//!
//! Every successful `connect` hands a [`MockPeer`] to the test through the
//! receiver returned by [`MockTransport::new`]. Like the WebSocket pump, a
//! [`Frame::Close`] written by the client is answered with
//! [`TransportEvent::Closed`] carrying the same code.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};

use super::{CloseInfo, Frame, Transport, TransportEvent, TransportLink};

/// Test double for [`Transport`].
pub(crate) struct MockTransport {
    peers: mpsc::UnboundedSender<MockPeer>,
    refuse: AtomicUsize,
    attempts: Mutex<Vec<Url>>,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            peers,
            refuse: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
        });
        (transport, rx)
    }

    /// Fails the next `count` connects as if the server were unreachable.
    pub(crate) fn refuse_next(&self, count: usize) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// URLs of every connect attempt, refused ones included.
    pub(crate) fn attempts(&self) -> Vec<Url> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &Url) -> Result<TransportLink> {
        self.attempts.lock().push(url.clone());

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::connection("connection refused"));
        }

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Frame>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();
        let (sent_tx, sent) = mpsc::unbounded_channel();

        let echo = incoming_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                let close = match &frame {
                    Frame::Close(info) => Some(info.clone()),
                    Frame::Text(_) => None,
                };
                let _ = sent_tx.send(frame);
                if let Some(info) = close {
                    let _ = echo.send(TransportEvent::Closed(info));
                    break;
                }
            }
        });

        let _ = self.peers.send(MockPeer {
            url: url.clone(),
            sent,
            events: incoming_tx,
        });

        Ok(TransportLink { outgoing, incoming })
    }
}

/// Server side of one mock link.
pub(crate) struct MockPeer {
    pub(crate) url: Url,
    sent: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockPeer {
    /// Pushes a text frame to the client.
    pub(crate) fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Message(text.into()));
    }

    /// Reports a transport error to the client.
    pub(crate) fn push_error(&self, detail: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(detail.into()));
    }

    /// Closes the link from the server side.
    pub(crate) fn close(&self, code: u16) {
        let _ = self.events.send(TransportEvent::Closed(CloseInfo::new(code, "")));
    }

    /// Waits for the next frame the client writes.
    pub(crate) async fn next_frame(&mut self) -> Option<Frame> {
        self.sent.recv().await
    }

    /// Returns a frame already written by the client, if any.
    pub(crate) fn try_frame(&mut self) -> Option<Frame> {
        self.sent.try_recv().ok()
    }
}
