//! Transport abstraction: a duplex, event-capable link to the messaging server.
//!
//! The connection manager only sees [`Transport`] and [`TransportLink`]; the
//! concrete protocol (WebSocket today) is an implementation detail.

pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{error::TransportError, infrastructure::dto::websocket::WireFrame};

pub use websocket::WebSocketTransport;

/// Why a link went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called locally; never triggers reconnection
    ClientDisconnect,
    /// The server closed the session
    ServerDisconnect,
    /// The underlying stream ended without a close handshake
    TransportClose,
    /// The underlying stream failed
    TransportError(String),
}

impl DisconnectReason {
    /// Wire-compatible reason string.
    pub fn as_str(&self) -> &str {
        match self {
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError(_) => "transport error",
        }
    }

    /// Whether this reason is an explicit local `disconnect()`.
    pub fn is_local(&self) -> bool {
        matches!(self, DisconnectReason::ClientDisconnect)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::TransportError(detail) => write!(f, "transport error: {}", detail),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Something the transport delivers to the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(WireFrame),
    Closed(DisconnectReason),
}

/// A live link: frames queued on `outbound` are written in order; frames read
/// from the server arrive on `inbound`. Dropping `outbound` closes the link.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<WireFrame>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// The far side of an in-memory [`TransportLink`].
#[derive(Debug)]
pub struct LinkPeer {
    pub outbound: mpsc::UnboundedReceiver<WireFrame>,
    pub inbound: mpsc::UnboundedSender<InboundFrame>,
}

impl LinkPeer {
    /// Deliver a server event to the link.
    pub fn push(&self, frame: WireFrame) -> bool {
        self.inbound.send(InboundFrame::Event(frame)).is_ok()
    }

    /// Simulate the link going away.
    pub fn close(&self, reason: DisconnectReason) -> bool {
        self.inbound.send(InboundFrame::Closed(reason)).is_ok()
    }

    /// Frames written so far, without waiting for more.
    pub fn drain(&mut self) -> Vec<WireFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl TransportLink {
    /// Create an in-memory link and its peer, used by custom transports and tests.
    pub fn pair() -> (TransportLink, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                outbound: out_tx,
                inbound: in_rx,
            },
            LinkPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }
}

/// Opens links to a messaging server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new link. Resolves once the transport-level connect completes.
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_client_disconnect_is_local() {
        // テスト項目: ローカルの切断理由のみが is_local と判定される
        // given (前提条件):
        let reasons = [
            DisconnectReason::ClientDisconnect,
            DisconnectReason::ServerDisconnect,
            DisconnectReason::TransportClose,
            DisconnectReason::TransportError("reset".to_string()),
        ];

        // when (操作):
        let local: Vec<bool> = reasons.iter().map(DisconnectReason::is_local).collect();

        // then (期待する結果):
        assert_eq!(local, vec![true, false, false, false]);
        assert_eq!(reasons[2].as_str(), "transport close");
    }

    #[tokio::test]
    async fn test_link_pair_carries_frames_both_ways() {
        // テスト項目: メモリ上のリンクで双方向にフレームが届く
        // given (前提条件):
        let (mut link, mut peer) = TransportLink::pair();
        let frame = WireFrame {
            event: "typing".to_string(),
            data: serde_json::json!({"conversationId": "c1", "isTyping": true}),
        };

        // when (操作):
        link.outbound.send(frame.clone()).unwrap();
        peer.close(DisconnectReason::TransportClose);

        // then (期待する結果):
        assert_eq!(peer.drain(), vec![frame]);
        assert_eq!(
            link.inbound.recv().await,
            Some(InboundFrame::Closed(DisconnectReason::TransportClose))
        );
    }
}
