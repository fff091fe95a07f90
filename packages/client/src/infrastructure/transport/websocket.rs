//! WebSocket transport built on tokio-tungstenite.
//!
//! `open` performs the WebSocket handshake, then splits the stream into a
//! writer task (drains the outbound channel) and a reader task (decodes text
//! frames into [`WireFrame`]s). The reader reports exactly one
//! [`InboundFrame::Closed`] when the stream ends.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::{DisconnectReason, InboundFrame, Transport, TransportLink};
use crate::{error::TransportError, infrastructure::dto::websocket::WireFrame};

/// WebSocket implementation of [`Transport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!(
            "WebSocket handshake with {} completed ({})",
            url,
            response.status()
        );

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundFrame>();

        // Writer: runs until the manager drops its sender, then closes politely.
        let writer_tx = in_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to serialize '{}' frame: {}", frame.event, e);
                        continue;
                    }
                };

                if let Err(e) = write.send(Message::Text(json.into())).await {
                    tracing::warn!("Failed to send '{}' frame: {}", frame.event, e);
                    let _ = writer_tx.send(InboundFrame::Closed(DisconnectReason::TransportError(
                        e.to_string(),
                    )));
                    return;
                }
            }

            if let Err(e) = write.close().await {
                tracing::debug!("WebSocket close handshake failed: {}", e);
            }
        });

        // Reader: stops early once nobody listens to inbound frames anymore.
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = in_tx.closed() => return,
                    next = read.next() => match next {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<WireFrame>(&text) {
                                Ok(frame) => {
                                    if in_tx.send(InboundFrame::Event(frame)).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
                            }
                        }
                        Some(Ok(Message::Close(_))) => break DisconnectReason::ServerDisconnect,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break DisconnectReason::TransportError(e.to_string()),
                        None => break DisconnectReason::TransportClose,
                    }
                }
            };

            tracing::debug!("WebSocket reader finished: {}", reason);
            let _ = in_tx.send(InboundFrame::Closed(reason));
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
