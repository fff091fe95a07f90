//! Connection lifecycle: connect, authenticate, disconnect, reconnect with backoff.
//!
//! ## State machine
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!      ^                          |                  |
//!      |                        error           unexpected drop
//!      |                          v                  v
//!      +---- attempts exhausted -- Reconnecting <----+
//! ```
//!
//! Every transition is announced as a `state_changed` event, including the
//! ones no `connect`/`disconnect` event accompanies: the first `connect()`,
//! `disconnect()` during backoff and running out of attempts.
//!
//! Every `connect()`/`disconnect()` bumps a generation counter. Reader tasks
//! and scheduled backoff attempts capture the generation they were created
//! for and do nothing once it is stale, so a `disconnect()` in the middle of
//! a backoff wait can never resurrect the connection.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use uuid::Uuid;

use super::{
    backoff::{backoff_delay, should_attempt_reconnect},
    bus::{EventBus, Subscription},
    event::{ConnectionEvent, EventKind},
};
use crate::{
    domain::{ConversationId, MessageContent, MessageType},
    error::{ConnectionError, TransportError},
    infrastructure::{
        dto::websocket::{
            ConversationPayload, GetConversationsPayload, GetMessagesPayload,
            SendMessagePayload, TypingPayload, WireFrame, outbound,
        },
        transport::{DisconnectReason, InboundFrame, Transport, TransportLink, WebSocketTransport},
    },
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BASE_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Tunables of the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Upper bound on the transport-level connect
    pub connect_timeout: Duration,
    /// Delay before the first reconnection attempt
    pub base_reconnect_delay: Duration,
    /// Ceiling of the exponential backoff
    pub max_reconnect_delay: Duration,
    /// Reconnection attempts before settling into `Disconnected`
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            base_reconnect_delay: DEFAULT_BASE_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ConnectionConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_reconnect_delay = base;
        self.max_reconnect_delay = max;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for (or performing) a backoff attempt after an unexpected loss
    Reconnecting,
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<WireFrame>,
    reader: Option<JoinHandle<()>>,
}

struct LinkState {
    connection_state: ConnectionState,
    /// Last state announced on the bus
    published_state: ConnectionState,
    is_connecting: bool,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    generation: u64,
    url: Option<String>,
    link: Option<ActiveLink>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    bus: EventBus,
    state: Mutex<LinkState>,
}

/// Owns the single transport link to the messaging server.
///
/// Cloning is cheap and yields a handle to the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager over an arbitrary transport.
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let state = LinkState {
            connection_state: ConnectionState::Disconnected,
            published_state: ConnectionState::Disconnected,
            is_connecting: false,
            reconnect_attempts: 0,
            reconnect_delay: config.base_reconnect_delay,
            generation: 0,
            url: None,
            link: None,
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                bus: EventBus::new(),
                state: Mutex::new(state),
            }),
        }
    }

    /// Create a manager that talks WebSocket.
    pub fn websocket(config: ConnectionConfig) -> Self {
        Self::new(Arc::new(WebSocketTransport::new()), config)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Subscribe to a connection event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock_state().connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock_state().reconnect_attempts
    }

    /// Delay used for the most recently scheduled reconnection attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.inner.lock_state().reconnect_delay
    }

    /// Open the link to `server_url`.
    ///
    /// No-op while already connected or connecting. A failed connect is
    /// reported to the caller and also enters the backoff schedule.
    pub async fn connect(&self, server_url: &str) -> Result<(), ConnectionError> {
        let generation = {
            let mut state = self.inner.lock_state();
            if state.is_connecting || state.connection_state == ConnectionState::Connected {
                tracing::debug!(
                    "connect({}) ignored: already {:?}",
                    server_url,
                    state.connection_state
                );
                return Ok(());
            }

            // A manual connect starts a fresh cycle and supersedes pending backoff.
            state.generation += 1;
            state.url = Some(server_url.to_string());
            state.is_connecting = true;
            state.connection_state = ConnectionState::Connecting;
            state.reconnect_attempts = 0;
            state.reconnect_delay = self.inner.config.base_reconnect_delay;
            state.generation
        };
        self.inner.publish_state();

        tracing::info!("Connecting to {}", server_url);
        Arc::clone(&self.inner)
            .establish(server_url.to_string(), generation)
            .await
    }

    /// Tear the link down. Never triggers reconnection.
    pub fn disconnect(&self) {
        let link = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.is_connecting = false;
            state.connection_state = ConnectionState::Disconnected;
            state.reconnect_attempts = 0;
            state.reconnect_delay = self.inner.config.base_reconnect_delay;
            state.link.take()
        };
        self.inner.publish_state();

        let Some(link) = link else {
            tracing::debug!("disconnect() without a live link");
            return;
        };
        if let Some(reader) = link.reader {
            reader.abort();
        }
        // Dropping the outbound sender closes the transport.
        drop(link.outbound);

        tracing::info!("Disconnected from messaging server");
        self.inner.bus.emit(&ConnectionEvent::Disconnect {
            reason: DisconnectReason::ClientDisconnect,
        });
    }

    /// Send the credential token. The outcome arrives as an `authenticated`
    /// or `authentication_error` event.
    pub fn authenticate(&self, token: &str) -> Result<(), ConnectionError> {
        if token.trim().is_empty() {
            return Err(ConnectionError::EmptyToken);
        }
        self.inner.send(outbound::AUTHENTICATE, &token)
    }

    /// Send a message. Returns the client-generated correlation id attached
    /// to the outbound frame.
    pub fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: MessageContent,
        message_type: MessageType,
    ) -> Result<String, ConnectionError> {
        let client_message_id = Uuid::new_v4().to_string();
        let payload = SendMessagePayload {
            conversation_id: conversation_id.to_string(),
            content,
            message_type,
            client_message_id: Some(client_message_id.clone()),
        };
        self.inner.send(outbound::SEND_MESSAGE, &payload)?;
        Ok(client_message_id)
    }

    pub fn mark_messages_read(&self, conversation_id: &ConversationId) -> Result<(), ConnectionError> {
        self.inner
            .send(outbound::MARK_MESSAGES_READ, &conversation_payload(conversation_id))
    }

    pub fn get_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        page_size: u32,
    ) -> Result<(), ConnectionError> {
        let payload = GetMessagesPayload {
            conversation_id: conversation_id.to_string(),
            page,
            limit: page_size,
        };
        self.inner.send(outbound::GET_MESSAGES, &payload)
    }

    pub fn get_conversations(&self) -> Result<(), ConnectionError> {
        self.inner
            .send(outbound::GET_CONVERSATIONS, &GetConversationsPayload::default())
    }

    /// Best-effort presence signal; silently dropped when disconnected.
    pub fn set_typing(&self, conversation_id: &ConversationId, is_typing: bool) {
        let payload = TypingPayload {
            conversation_id: conversation_id.to_string(),
            is_typing,
        };
        self.inner.send_best_effort(outbound::TYPING, &payload);
    }

    /// Best-effort; silently dropped when disconnected.
    pub fn join_conversation(&self, conversation_id: &ConversationId) {
        self.inner
            .send_best_effort(outbound::JOIN_CONVERSATION, &conversation_payload(conversation_id));
    }

    /// Best-effort; silently dropped when disconnected.
    pub fn leave_conversation(&self, conversation_id: &ConversationId) {
        self.inner
            .send_best_effort(outbound::LEAVE_CONVERSATION, &conversation_payload(conversation_id));
    }
}

fn conversation_payload(conversation_id: &ConversationId) -> ConversationPayload {
    ConversationPayload {
        conversation_id: conversation_id.to_string(),
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    /// Emit `state_changed` if the state moved since the last announcement.
    fn publish_state(&self) {
        let state = {
            let mut state = self.lock_state();
            if state.published_state == state.connection_state {
                return;
            }
            state.published_state = state.connection_state;
            state.connection_state
        };
        tracing::debug!("Connection state is now {:?}", state);
        self.bus.emit(&ConnectionEvent::StateChanged { state });
    }

    fn send<T: Serialize>(&self, event: &str, payload: &T) -> Result<(), ConnectionError> {
        let frame =
            WireFrame::new(event, payload).map_err(|e| ConnectionError::Encode(e.to_string()))?;

        let state = self.lock_state();
        if state.connection_state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let Some(link) = state.link.as_ref() else {
            return Err(ConnectionError::NotConnected);
        };
        link.outbound
            .send(frame)
            .map_err(|_| ConnectionError::NotConnected)
    }

    fn send_best_effort<T: Serialize>(&self, event: &str, payload: &T) {
        if let Err(e) = self.send(event, payload) {
            tracing::debug!("Dropped '{}' presence signal: {}", event, e);
        }
    }

    /// Open a link for `generation` and install it if still current.
    async fn establish(self: Arc<Self>, url: String, generation: u64) -> Result<(), ConnectionError> {
        let timeout = self.config.connect_timeout;
        let opened = match tokio::time::timeout(timeout, self.transport.open(&url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                {
                    let mut state = self.lock_state();
                    if state.generation != generation {
                        return Err(e.into());
                    }
                    state.is_connecting = false;
                    state.connection_state = ConnectionState::Disconnected;
                }
                tracing::warn!("Connection to {} failed: {}", url, e);
                self.schedule_reconnect(generation, None);
                return Err(e.into());
            }
        };

        let TransportLink { outbound, inbound } = link;
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                tracing::debug!("Discarding link opened for a superseded connect");
                return Ok(());
            }
            state.link = Some(ActiveLink {
                outbound,
                reader: None,
            });
            state.connection_state = ConnectionState::Connected;
            state.is_connecting = false;
            state.reconnect_attempts = 0;
            state.reconnect_delay = self.config.base_reconnect_delay;
        }

        tracing::info!("Connected to {}", url);
        self.publish_state();
        self.bus.emit(&ConnectionEvent::Connect);

        // Start reading only after `connect` subscribers ran, so server
        // events never overtake the connect notification.
        let reader = tokio::spawn(Arc::clone(&self).read_loop(inbound, generation));
        let mut state = self.lock_state();
        let current = state.generation == generation;
        match state.link.as_mut() {
            Some(active) if current => active.reader = Some(reader),
            _ => reader.abort(),
        }
        Ok(())
    }

    async fn read_loop(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
        generation: u64,
    ) {
        while let Some(frame) = inbound.recv().await {
            match frame {
                InboundFrame::Event(wire) => {
                    if !self.is_current(generation) {
                        return;
                    }
                    let name = wire.event.clone();
                    match ConnectionEvent::decode(wire) {
                        Ok(Some(event)) => {
                            self.bus.emit(&event);
                        }
                        Ok(None) => tracing::debug!("Ignoring unhandled event '{}'", name),
                        Err(e) => tracing::warn!("Dropping '{}' event: {}", name, e),
                    }
                }
                InboundFrame::Closed(reason) => {
                    self.handle_link_lost(generation, reason);
                    return;
                }
            }
        }
        self.handle_link_lost(generation, DisconnectReason::TransportClose);
    }

    fn handle_link_lost(self: &Arc<Self>, generation: u64, reason: DisconnectReason) {
        {
            let mut state = self.lock_state();
            if state.generation != generation || state.link.is_none() {
                return;
            }
            // The reader is the calling task; dropping its handle detaches it.
            state.link = None;
            state.connection_state = ConnectionState::Disconnected;
        }

        tracing::warn!("Connection lost: {}", reason);
        // Schedule first so `disconnect` subscribers observe `Reconnecting`.
        self.schedule_reconnect(generation, Some(&reason));
        self.bus.emit(&ConnectionEvent::Disconnect { reason });
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64, reason: Option<&DisconnectReason>) {
        let delay = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            if !should_attempt_reconnect(
                reason,
                state.reconnect_attempts,
                self.config.max_reconnect_attempts,
            ) {
                state.connection_state = ConnectionState::Disconnected;
                if reason.is_none_or(|reason| !reason.is_local()) {
                    tracing::error!(
                        "Failed to reconnect after {} attempts; staying disconnected",
                        state.reconnect_attempts
                    );
                }
                drop(state);
                self.publish_state();
                return;
            }

            state.reconnect_attempts += 1;
            let delay = backoff_delay(
                state.reconnect_attempts,
                self.config.base_reconnect_delay,
                self.config.max_reconnect_delay,
            );
            state.reconnect_delay = delay;
            state.connection_state = ConnectionState::Reconnecting;
            tracing::info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                state.reconnect_attempts,
                self.config.max_reconnect_attempts
            );
            delay
        };
        self.publish_state();

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.reconnect(generation).await;
        });
    }

    async fn reconnect(self: Arc<Self>, generation: u64) {
        let url = {
            let mut state = self.lock_state();
            if state.generation != generation
                || state.connection_state != ConnectionState::Reconnecting
                || state.is_connecting
            {
                tracing::debug!("Skipping stale reconnection attempt");
                return;
            }
            let Some(url) = state.url.clone() else {
                return;
            };
            state.is_connecting = true;
            url
        };

        if let Err(e) = self.establish(url, generation).await {
            tracing::debug!("Reconnection attempt failed: {}", e);
        }
    }
}
