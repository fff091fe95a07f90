//! The synchronization store.
//!
//! Subscribes to the connection's events and folds them into a
//! [`StoreSnapshot`]. Every mutation publishes a fresh snapshot on a
//! `watch` channel. Commands forward to the connection manager and never
//! mutate state optimistically: the authoritative copy always arrives as a
//! later server event.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tokio::{sync::watch, task::JoinHandle};

use super::state::{StoreConfig, StoreSnapshot};
use crate::{
    connection::{ConnectionEvent, ConnectionManager, ConnectionState, EventKind, Subscription},
    domain::{
        Conversation, ConversationId, Message, MessageContent, MessageId, MessageType, UserId,
        reconcile,
    },
    error::{StoreError, SyncError},
};

type TypingKey = (ConversationId, UserId);

struct TypingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct StoreState {
    snapshot: StoreSnapshot,
    /// Message ids already reconciled, per conversation
    seen_messages: HashMap<ConversationId, HashSet<MessageId>>,
    typing_timers: HashMap<TypingKey, TypingTimer>,
    next_timer_id: u64,
}

impl StoreState {
    fn clear_typing(&mut self) {
        for (_, timer) in self.typing_timers.drain() {
            timer.handle.abort();
        }
        self.snapshot.typing.clear();
    }

    /// Record a delivery. `false` when the id was already seen.
    fn record_seen(&mut self, message: &Message) -> bool {
        self.seen_messages
            .entry(message.conversation_id.clone())
            .or_default()
            .insert(message.id.clone())
    }

    /// Forget conversations that are neither listed nor in view.
    fn prune_seen(&mut self) {
        let snapshot = &self.snapshot;
        self.seen_messages.retain(|conversation_id, _| {
            snapshot.active_conversation.as_ref() == Some(conversation_id)
                || snapshot.conversation(conversation_id).is_some()
        });
    }
}

struct StoreInner {
    connection: ConnectionManager,
    config: StoreConfig,
    state: Mutex<StoreState>,
    updates: watch::Sender<StoreSnapshot>,
}

/// Reconciled view of conversations and messages for one connected client.
pub struct SyncStore {
    inner: Arc<StoreInner>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl SyncStore {
    /// Create a store bound to `connection`'s event stream.
    pub fn new(connection: ConnectionManager, config: StoreConfig) -> Self {
        let snapshot = StoreSnapshot {
            is_connected: connection.is_connected(),
            connection_state: connection.state(),
            ..StoreSnapshot::default()
        };
        let (updates, _) = watch::channel(snapshot.clone());

        let inner = Arc::new(StoreInner {
            connection,
            config,
            state: Mutex::new(StoreState {
                snapshot,
                seen_messages: HashMap::new(),
                typing_timers: HashMap::new(),
                next_timer_id: 0,
            }),
            updates,
        });

        let subscriptions = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let weak = Arc::downgrade(&inner);
                inner.connection.on(kind, move |event| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_event(event);
                    }
                })
            })
            .collect();

        Self {
            inner,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock_state().snapshot.clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.inner.lock_state().snapshot.conversations.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock_state().snapshot.messages.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.lock_state().snapshot.loading()
    }

    pub fn error(&self) -> Option<SyncError> {
        self.inner.lock_state().snapshot.error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.mutate(|state| state.snapshot.error = None);
    }

    pub fn typing_users(&self, conversation_id: &ConversationId) -> Vec<UserId> {
        self.inner.lock_state().snapshot.typing_users(conversation_id)
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.lock_state().snapshot.active_conversation.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Send a message. Nothing is appended locally; the server echo arrives
    /// as a `new_message` event. Returns the correlation id of the send.
    pub fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: impl Into<MessageContent>,
        message_type: MessageType,
    ) -> Result<String, StoreError> {
        Ok(self
            .inner
            .connection
            .send_message(conversation_id, content.into(), message_type)?)
    }

    /// Ask the server to mark a conversation read. Local read flags change
    /// only when the matching `message_read` events arrive.
    pub fn mark_messages_as_read(&self, conversation_id: &ConversationId) -> Result<(), StoreError> {
        Ok(self.inner.connection.mark_messages_read(conversation_id)?)
    }

    /// Request a page of history for `conversation_id`.
    pub fn load_messages(&self, conversation_id: &ConversationId, page: u32) -> Result<(), StoreError> {
        self.inner.load_messages(conversation_id, page)
    }

    pub fn load_conversations(&self) -> Result<(), StoreError> {
        self.inner.load_conversations()
    }

    /// Best-effort typing signal. Never fails.
    pub fn set_typing(&self, conversation_id: &ConversationId, is_typing: bool) {
        self.inner.connection.set_typing(conversation_id, is_typing);
    }

    /// Switch the conversation in view.
    ///
    /// Leaves the previous conversation, joins the new one, clears the message
    /// list and requests the first page of history. The new id is active even
    /// if the history request fails.
    pub fn set_active_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<(), StoreError> {
        let previous = {
            let mut state = self.inner.lock_state();
            if state.snapshot.active_conversation == conversation_id {
                return Ok(());
            }
            let previous = std::mem::replace(
                &mut state.snapshot.active_conversation,
                conversation_id.clone(),
            );
            state.snapshot.messages.clear();
            state.snapshot.loading_messages = false;
            self.inner.publish(&state);
            previous
        };

        if let Some(previous) = previous.as_ref() {
            self.inner.connection.leave_conversation(previous);
        }
        let Some(next) = conversation_id else {
            return Ok(());
        };
        self.inner.connection.join_conversation(&next);
        self.inner.load_messages(&next, 1)
    }

    /// Unsubscribe from the connection and cancel every typing timer.
    pub fn teardown(&self) {
        let subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.inner.mutate(|state| {
            state.clear_typing();
            state.seen_messages.clear();
        });
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl StoreInner {
    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &StoreState) {
        self.updates.send_replace(state.snapshot.clone());
    }

    fn mutate(&self, f: impl FnOnce(&mut StoreState)) {
        let mut state = self.lock_state();
        f(&mut state);
        self.publish(&state);
    }

    fn load_messages(&self, conversation_id: &ConversationId, page: u32) -> Result<(), StoreError> {
        self.mutate(|state| state.snapshot.loading_messages = true);
        let result = self
            .connection
            .get_messages(conversation_id, page, self.config.page_size);
        if let Err(e) = &result {
            tracing::warn!("Failed to request messages for {}: {}", conversation_id, e);
            self.mutate(|state| {
                state.snapshot.loading_messages = false;
                state.snapshot.error = Some(SyncError::from(e));
            });
        }
        Ok(result?)
    }

    fn load_conversations(&self) -> Result<(), StoreError> {
        self.mutate(|state| state.snapshot.loading_conversations = true);
        let result = self.connection.get_conversations();
        if let Err(e) = &result {
            tracing::warn!("Failed to request conversations: {}", e);
            self.mutate(|state| {
                state.snapshot.loading_conversations = false;
                state.snapshot.error = Some(SyncError::from(e));
            });
        }
        Ok(result?)
    }

    fn handle_event(self: &Arc<Self>, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connect => self.mutate(StoreState::clear_typing),
            ConnectionEvent::Disconnect { reason } => {
                tracing::debug!("Store observed disconnect: {}", reason);
                self.mutate(|state| {
                    state.snapshot.loading_conversations = false;
                    state.snapshot.loading_messages = false;
                    state.clear_typing();
                });
            }
            ConnectionEvent::StateChanged { .. } => {
                // Announcements may race each other; the manager holds the latest.
                let connection_state = self.connection.state();
                let mut state = self.lock_state();
                if state.snapshot.connection_state != connection_state {
                    state.snapshot.connection_state = connection_state;
                    state.snapshot.is_connected = connection_state == ConnectionState::Connected;
                    self.publish(&state);
                }
            }
            ConnectionEvent::Authenticated { .. } => self.on_authenticated(),
            ConnectionEvent::AuthenticationError { message } => {
                tracing::debug!("Store ignoring authentication error: {}", message);
            }
            ConnectionEvent::NewMessage(message) => self.on_new_message(message),
            ConnectionEvent::MessageRead {
                message_id,
                conversation_id,
            } => {
                let mut state = self.lock_state();
                if state.snapshot.active_conversation.as_ref() == Some(conversation_id)
                    && reconcile::mark_message_read(&mut state.snapshot.messages, message_id)
                {
                    self.publish(&state);
                }
            }
            ConnectionEvent::ConversationUpdated(conversation) => self.mutate(|state| {
                reconcile::upsert_conversation(
                    &mut state.snapshot.conversations,
                    conversation.clone(),
                );
            }),
            ConnectionEvent::ConversationsLoaded {
                conversations,
                success,
                message,
            } => self.mutate(|state| {
                state.snapshot.loading_conversations = false;
                if *success {
                    let mut conversations = conversations.clone();
                    reconcile::sort_conversations(&mut conversations);
                    state.snapshot.conversations = conversations;
                    state.prune_seen();
                } else {
                    state.snapshot.error = Some(SyncError::Load(
                        message
                            .clone()
                            .unwrap_or_else(|| "Failed to load conversations".to_string()),
                    ));
                }
            }),
            ConnectionEvent::MessagesLoaded {
                conversation_id,
                messages,
                success,
                message,
            } => self.on_messages_loaded(conversation_id, messages, *success, message.as_deref()),
            ConnectionEvent::UserTyping {
                user_id,
                conversation_id,
                is_typing,
            } => self.on_user_typing(conversation_id, user_id, *is_typing),
            ConnectionEvent::Error { message } => {
                tracing::warn!("Server error: {}", message);
                self.mutate(|state| {
                    state.snapshot.error = Some(SyncError::Server(message.clone()));
                    state.snapshot.loading_conversations = false;
                    state.snapshot.loading_messages = false;
                });
            }
        }
    }

    fn on_authenticated(&self) {
        tracing::info!("Authenticated; loading conversations");
        // Failures are already surfaced in the error field.
        let _ = self.load_conversations();

        let active = self.lock_state().snapshot.active_conversation.clone();
        if let Some(active) = active {
            self.connection.join_conversation(&active);
            let _ = self.load_messages(&active, 1);
        }
    }

    fn on_new_message(&self, message: &Message) {
        let mut state = self.lock_state();
        let first_delivery = state.record_seen(message);
        let is_active = state.snapshot.active_conversation.as_ref() == Some(&message.conversation_id);

        let mut changed = false;
        if first_delivery {
            changed |= reconcile::apply_message_to_conversations(
                &mut state.snapshot.conversations,
                message,
                is_active,
            );
        }
        if is_active {
            changed |= reconcile::insert_message(&mut state.snapshot.messages, message.clone());
        }
        if changed {
            self.publish(&state);
        }
    }

    fn on_messages_loaded(
        &self,
        conversation_id: &ConversationId,
        messages: &[Message],
        success: bool,
        failure: Option<&str>,
    ) {
        let mut state = self.lock_state();
        if state.snapshot.active_conversation.as_ref() != Some(conversation_id) {
            tracing::debug!("Discarding stale history for {}", conversation_id);
            return;
        }

        state.snapshot.loading_messages = false;
        if success {
            let mut messages = messages.to_vec();
            reconcile::normalize_messages(&mut messages);
            state
                .seen_messages
                .entry(conversation_id.clone())
                .or_default()
                .extend(messages.iter().map(|message| message.id.clone()));
            state.snapshot.messages = messages;
        } else {
            state.snapshot.error = Some(SyncError::Load(
                failure.unwrap_or("Failed to load messages").to_string(),
            ));
        }
        self.publish(&state);
    }

    fn on_user_typing(self: &Arc<Self>, conversation_id: &ConversationId, user_id: &UserId, is_typing: bool) {
        let key = (conversation_id.clone(), user_id.clone());
        let mut state = self.lock_state();

        if !is_typing {
            if let Some(timer) = state.typing_timers.remove(&key) {
                timer.handle.abort();
            }
            if state.snapshot.typing.stop(conversation_id, user_id) {
                self.publish(&state);
            }
            return;
        }

        state.next_timer_id += 1;
        let timer_id = state.next_timer_id;
        let weak: Weak<StoreInner> = Arc::downgrade(self);
        let expiry = self.config.typing_expiry;
        let timer_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire_typing(&timer_key, timer_id);
            }
        });
        if let Some(previous) = state.typing_timers.insert(key, TypingTimer { id: timer_id, handle }) {
            previous.handle.abort();
        }

        if state
            .snapshot
            .typing
            .start(conversation_id.clone(), user_id.clone())
        {
            self.publish(&state);
        }
    }

    fn expire_typing(&self, key: &TypingKey, timer_id: u64) {
        let mut state = self.lock_state();
        // A refresh may have replaced this timer after its sleep finished.
        if state.typing_timers.get(key).is_none_or(|timer| timer.id != timer_id) {
            return;
        }
        state.typing_timers.remove(key);
        let (conversation_id, user_id) = key;
        if state.snapshot.typing.stop(conversation_id, user_id) {
            tracing::debug!("Typing indicator for {} in {} expired", user_id, conversation_id);
            self.publish(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        connection::ConnectionConfig,
        domain::reconcile::fixtures::{at, conversation, message},
        error::ConnectionError,
        infrastructure::{
            dto::websocket::WireFrame,
            transport::{DisconnectReason, LinkPeer, testing::ScriptedTransport},
        },
    };

    const URL: &str = "ws://chat.test/ws";

    fn cid(id: &str) -> ConversationId {
        ConversationId::new(id).unwrap()
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn offline_store() -> SyncStore {
        let connection = ConnectionManager::new(
            Arc::new(ScriptedTransport::new()),
            ConnectionConfig::default().with_max_reconnect_attempts(0),
        );
        SyncStore::new(connection, StoreConfig::default())
    }

    async fn connected_store() -> (SyncStore, LinkPeer) {
        let transport = Arc::new(ScriptedTransport::new());
        let peer = transport.push_link();
        let connection = ConnectionManager::new(transport, ConnectionConfig::default());
        connection.connect(URL).await.unwrap();
        (SyncStore::new(connection, StoreConfig::default()), peer)
    }

    fn emit(store: &SyncStore, event: ConnectionEvent) {
        store.connection().bus().emit(&event);
    }

    fn message_ids(store: &SyncStore) -> Vec<String> {
        store
            .messages()
            .into_iter()
            .map(|m| m.id.into_string())
            .collect()
    }

    fn conversation_ids(store: &SyncStore) -> Vec<String> {
        store
            .conversations()
            .into_iter()
            .map(|c| c.id.into_string())
            .collect()
    }

    fn loaded(conversations: Vec<Conversation>) -> ConnectionEvent {
        ConnectionEvent::ConversationsLoaded {
            conversations,
            success: true,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_conversation_scenario_new_message_moves_conversation_to_front() {
        // テスト項目: 非アクティブな会話への新着で会話が先頭に移動し、未読数が 1 増える
        // given (前提条件):
        let (store, _peer) = connected_store().await;
        emit(&store, loaded(vec![conversation("A", 10), conversation("B", 20)]));
        assert_eq!(conversation_ids(&store), vec!["B", "A"]);
        store.set_active_conversation(Some(cid("B"))).unwrap();

        // when (操作):
        emit(&store, ConnectionEvent::NewMessage(message("m1", "A", 30)));

        // then (期待する結果):
        let conversations = store.conversations();
        assert_eq!(conversation_ids(&store), vec!["A", "B"]);
        assert_eq!(conversations[0].unread_count, 1);
        assert_eq!(conversations[0].last_message_at, at(30));
        assert_eq!(conversations[1], conversation("B", 20));
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_new_messages_for_active_conversation_stay_ordered_and_unique() {
        // テスト項目: 順不同・重複したメッセージでも一覧は昇順かつ一意になる
        // given (前提条件):
        let (store, _peer) = connected_store().await;
        emit(&store, loaded(vec![conversation("A", 0)]));
        store.set_active_conversation(Some(cid("A"))).unwrap();

        // when (操作):
        for (id, ts) in [("m3", 30), ("m1", 10), ("m3", 30), ("m2", 20), ("m1", 10)] {
            emit(&store, ConnectionEvent::NewMessage(message(id, "A", ts)));
        }

        // then (期待する結果):
        assert_eq!(message_ids(&store), vec!["m1", "m2", "m3"]);
        let conversations = store.conversations();
        assert_eq!(conversations[0].unread_count, 0);
        assert_eq!(conversations[0].last_message_at, at(30));
    }

    #[tokio::test]
    async fn test_redelivered_message_counts_unread_once() {
        // テスト項目: 同じメッセージの再配信で未読数が二重に増えない
        // given (前提条件):
        let store = offline_store();
        emit(&store, loaded(vec![conversation("A", 0)]));

        // when (操作):
        emit(&store, ConnectionEvent::NewMessage(message("m1", "A", 10)));
        emit(&store, ConnectionEvent::NewMessage(message("m1", "A", 10)));

        // then (期待する結果):
        assert_eq!(store.conversations()[0].unread_count, 1);
    }

    #[tokio::test]
    async fn test_stale_messages_loaded_is_discarded() {
        // テスト項目: アクティブでない会話の履歴応答は破棄される
        // given (前提条件):
        let (store, _peer) = connected_store().await;
        store.set_active_conversation(Some(cid("A"))).unwrap();
        store.set_active_conversation(Some(cid("B"))).unwrap();
        assert!(store.loading());

        // when (操作):
        emit(
            &store,
            ConnectionEvent::MessagesLoaded {
                conversation_id: cid("A"),
                messages: vec![message("a1", "A", 10)],
                success: true,
                message: None,
            },
        );

        // then (期待する結果):
        assert!(store.messages().is_empty());
        assert!(store.loading());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_messages_loaded_replaces_list_sorted_and_clears_loading() {
        // テスト項目: 履歴応答で一覧が置き換えられ、読み込み中フラグが解除される
        // given (前提条件):
        let (store, _peer) = connected_store().await;
        store.set_active_conversation(Some(cid("A"))).unwrap();
        emit(&store, ConnectionEvent::NewMessage(message("old", "A", 1)));

        // when (操作):
        emit(
            &store,
            ConnectionEvent::MessagesLoaded {
                conversation_id: cid("A"),
                messages: vec![
                    message("m2", "A", 20),
                    message("m1", "A", 10),
                    message("m2", "A", 20),
                ],
                success: true,
                message: None,
            },
        );

        // then (期待する結果):
        assert_eq!(message_ids(&store), vec!["m1", "m2"]);
        assert!(!store.loading());
    }

    #[tokio::test]
    async fn test_failed_snapshot_clears_loading_and_surfaces_error() {
        // テスト項目: success=false の応答で読み込み中が解除され、エラーが記録される
        // given (前提条件):
        let (store, _peer) = connected_store().await;
        store.load_conversations().unwrap();
        assert!(store.loading());

        // when (操作):
        emit(
            &store,
            ConnectionEvent::ConversationsLoaded {
                conversations: vec![],
                success: false,
                message: Some("db unavailable".to_string()),
            },
        );

        // then (期待する結果):
        assert!(!store.loading());
        assert_eq!(
            store.error(),
            Some(SyncError::Load("db unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_conversation_updated_upserts_and_keeps_order() {
        // テスト項目: 会話更新イベントで置換または追加され、降順が保たれる
        // given (前提条件):
        let store = offline_store();
        emit(&store, loaded(vec![conversation("A", 10), conversation("B", 20)]));

        // when (操作):
        emit(&store, ConnectionEvent::ConversationUpdated(conversation("A", 40)));
        emit(&store, ConnectionEvent::ConversationUpdated(conversation("C", 30)));

        // then (期待する結果):
        assert_eq!(conversation_ids(&store), vec!["A", "C", "B"]);
    }

    #[tokio::test]
    async fn test_message_read_flips_flag_on_active_list() {
        // テスト項目: 既読イベントでアクティブな一覧のメッセージが既読になる
        // given (前提条件):
        let (store, _peer) = connected_store().await;
        store.set_active_conversation(Some(cid("A"))).unwrap();
        emit(&store, ConnectionEvent::NewMessage(message("m1", "A", 10)));

        // when (操作):
        emit(
            &store,
            ConnectionEvent::MessageRead {
                message_id: MessageId::new("m1").unwrap(),
                conversation_id: cid("A"),
            },
        );

        // then (期待する結果):
        assert!(store.messages()[0].is_read);
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced_without_touching_data() {
        // テスト項目: サーバーエラーはエラー欄に記録され、データは変更されない
        // given (前提条件):
        let store = offline_store();
        emit(&store, loaded(vec![conversation("A", 10)]));

        // when (操作):
        emit(&store, ConnectionEvent::Error { message: "first".to_string() });
        emit(&store, ConnectionEvent::Error { message: "second".to_string() });

        // then (期待する結果):
        assert_eq!(store.error(), Some(SyncError::Server("second".to_string())));
        assert_eq!(conversation_ids(&store), vec!["A"]);
    }

    #[tokio::test]
    async fn test_send_message_while_disconnected_fails_without_local_change() {
        // テスト項目: 未接続時の送信は即座に失敗し、メッセージ一覧は変わらない
        // given (前提条件):
        let store = offline_store();
        let _ = store.set_active_conversation(Some(cid("A")));

        // when (操作):
        let result = store.send_message(&cid("A"), "hello", MessageType::Text);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(StoreError::Connection(ConnectionError::NotConnected))
        );
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_does_not_insert_optimistically() {
        // テスト項目: 送信してもサーバーのエコーが届くまで一覧に追加されない
        // given (前提条件):
        let (store, mut peer) = connected_store().await;
        store.set_active_conversation(Some(cid("A"))).unwrap();

        // when (操作):
        let correlation = store
            .send_message(&cid("A"), "hello", MessageType::Text)
            .unwrap();

        // then (期待する結果):
        assert!(store.messages().is_empty());
        let sent = peer
            .drain()
            .into_iter()
            .find(|frame| frame.event == "send_message")
            .unwrap();
        assert_eq!(sent.data["clientMessageId"], json!(correlation));
    }

    #[tokio::test]
    async fn test_load_while_disconnected_never_leaves_loading_set() {
        // テスト項目: 未接続で読み込みに失敗しても読み込み中のまま残らない
        // given (前提条件):
        let store = offline_store();

        // when (操作):
        let result = store.load_conversations();

        // then (期待する結果):
        assert!(result.is_err());
        assert!(!store.loading());
        assert!(matches!(store.error(), Some(SyncError::Load(_))));
    }

    #[tokio::test]
    async fn test_switching_active_conversation_leaves_joins_and_loads() {
        // テスト項目: アクティブな会話の切り替えで退出・参加・履歴要求が送られる
        // given (前提条件):
        let (store, mut peer) = connected_store().await;
        store.set_active_conversation(Some(cid("A"))).unwrap();
        peer.drain();

        // when (操作):
        store.set_active_conversation(Some(cid("B"))).unwrap();

        // then (期待する結果):
        let frames: Vec<(String, serde_json::Value)> = peer
            .drain()
            .into_iter()
            .map(|frame| (frame.event, frame.data))
            .collect();
        assert_eq!(
            frames,
            vec![
                ("leave_conversation".to_string(), json!({"conversationId": "A"})),
                ("join_conversation".to_string(), json!({"conversationId": "B"})),
                (
                    "get_messages".to_string(),
                    json!({"conversationId": "B", "page": 1, "limit": 50})
                ),
            ]
        );
        assert_eq!(store.active_conversation(), Some(cid("B")));
    }

    #[tokio::test]
    async fn test_authenticated_triggers_initial_loads() {
        // テスト項目: 認証成功で会話一覧とアクティブな会話の履歴が要求される
        // given (前提条件):
        let (store, mut peer) = connected_store().await;
        store.set_active_conversation(Some(cid("A"))).unwrap();
        peer.drain();

        // when (操作):
        peer.push(WireFrame {
            event: "authenticated".to_string(),
            data: json!({"userId": "alice"}),
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // then (期待する結果):
        let events: Vec<String> = peer.drain().into_iter().map(|frame| frame.event).collect();
        assert_eq!(
            events,
            vec!["get_conversations", "join_conversation", "get_messages"]
        );
    }

    #[tokio::test]
    async fn test_subscribers_observe_published_snapshots() {
        // テスト項目: 状態の変更が watch 経由で購読者に通知される
        // given (前提条件):
        let store = offline_store();
        let mut updates = store.subscribe();

        // when (操作):
        emit(&store, loaded(vec![conversation("A", 10)]));

        // then (期待する結果):
        assert!(updates.has_changed().unwrap());
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.conversations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_indicator_expires_after_silence() {
        // テスト項目: 入力中イベントの後、一定時間何も届かなければ入力中表示が消える
        // given (前提条件):
        let store = offline_store();
        emit(
            &store,
            ConnectionEvent::UserTyping {
                user_id: uid("bob"),
                conversation_id: cid("A"),
                is_typing: true,
            },
        );
        assert_eq!(store.typing_users(&cid("A")), vec![uid("bob")]);

        // when (操作):
        tokio::time::sleep(Duration::from_millis(3100)).await;

        // then (期待する結果):
        assert!(store.typing_users(&cid("A")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_refresh_keeps_indicator_alive() {
        // テスト項目: 入力中イベントが繰り返し届く間は表示が維持される
        // given (前提条件):
        let store = offline_store();
        let typing = ConnectionEvent::UserTyping {
            user_id: uid("bob"),
            conversation_id: cid("A"),
            is_typing: true,
        };
        emit(&store, typing.clone());

        // when (操作):
        tokio::time::sleep(Duration::from_millis(2000)).await;
        emit(&store, typing.clone());
        tokio::time::sleep(Duration::from_millis(2000)).await;

        // then (期待する結果):
        assert_eq!(store.typing_users(&cid("A")), vec![uid("bob")]);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(store.typing_users(&cid("A")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_false_removes_user_immediately() {
        // テスト項目: 入力終了イベントで即座に入力中表示が消える
        // given (前提条件):
        let store = offline_store();
        emit(
            &store,
            ConnectionEvent::UserTyping {
                user_id: uid("bob"),
                conversation_id: cid("A"),
                is_typing: true,
            },
        );

        // when (操作):
        emit(
            &store,
            ConnectionEvent::UserTyping {
                user_id: uid("bob"),
                conversation_id: cid("A"),
                is_typing: false,
            },
        );

        // then (期待する結果):
        assert!(store.typing_users(&cid("A")).is_empty());
        assert!(store.inner.lock_state().typing_timers.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_typing_and_loading() {
        // テスト項目: 切断で入力中状態と読み込み中フラグがリセットされる
        // given (前提条件):
        let (store, peer) = connected_store().await;
        store.load_conversations().unwrap();
        emit(
            &store,
            ConnectionEvent::UserTyping {
                user_id: uid("bob"),
                conversation_id: cid("A"),
                is_typing: true,
            },
        );

        // when (操作):
        peer.close(DisconnectReason::TransportClose);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // then (期待する結果):
        let snapshot = store.snapshot();
        assert!(!snapshot.is_connected);
        assert!(!snapshot.loading());
        assert!(snapshot.typing.is_empty());
        assert_eq!(snapshot.connection_state, ConnectionState::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reconnects_leave_snapshot_disconnected() {
        // テスト項目: 再接続を使い切った後、スナップショットも Disconnected になる
        // given (前提条件):
        let (store, peer) = connected_store().await;
        let updates = store.subscribe();

        // when (操作): 以後の再接続はすべて失敗する
        peer.close(DisconnectReason::TransportClose);
        tokio::time::sleep(Duration::from_secs(120)).await;

        // then (期待する結果):
        assert_eq!(store.connection().state(), ConnectionState::Disconnected);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert!(!snapshot.is_connected);
        assert_eq!(updates.borrow().connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_backoff_leaves_snapshot_disconnected() {
        // テスト項目: バックオフ待機中に disconnect すると、スナップショットも Disconnected になる
        // given (前提条件):
        let (store, peer) = connected_store().await;
        let updates = store.subscribe();
        peer.close(DisconnectReason::TransportClose);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.snapshot().connection_state, ConnectionState::Reconnecting);

        // when (操作):
        store.connection().disconnect();

        // then (期待する結果):
        let snapshot = store.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert!(!snapshot.is_connected);
        assert_eq!(updates.borrow().connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_after_creation_is_mirrored_in_snapshot() {
        // テスト項目: ストア作成後の接続で、スナップショットが Connected になる
        // given (前提条件):
        let transport = Arc::new(ScriptedTransport::new());
        let _peer = transport.push_link();
        let connection = ConnectionManager::new(transport, ConnectionConfig::default());
        let store = SyncStore::new(connection.clone(), StoreConfig::default());
        let updates = store.subscribe();
        assert_eq!(store.snapshot().connection_state, ConnectionState::Disconnected);

        // when (操作):
        connection.connect(URL).await.unwrap();

        // then (期待する結果):
        assert!(store.snapshot().is_connected);
        assert_eq!(updates.borrow().connection_state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_seen_ledger_is_pruned_to_listed_conversations() {
        // テスト項目: 一覧から消えた会話の既読台帳は破棄される
        // given (前提条件):
        let store = offline_store();
        emit(&store, loaded(vec![conversation("A", 10), conversation("B", 20)]));
        emit(&store, ConnectionEvent::NewMessage(message("m1", "A", 30)));
        emit(&store, ConnectionEvent::NewMessage(message("m2", "B", 40)));

        // when (操作):
        emit(&store, loaded(vec![conversation("B", 40)]));

        // then (期待する結果):
        let state = store.inner.lock_state();
        assert!(!state.seen_messages.contains_key(&cid("A")));
        assert!(state.seen_messages[&cid("B")].contains(&MessageId::new("m2").unwrap()));
    }

    #[tokio::test]
    async fn test_teardown_unsubscribes_and_cancels_timers() {
        // テスト項目: 破棄時に購読が解除され、タイマーが止まる
        // given (前提条件):
        let store = offline_store();
        let connection = store.connection().clone();
        emit(&store, ConnectionEvent::NewMessage(message("m1", "A", 10)));
        emit(
            &store,
            ConnectionEvent::UserTyping {
                user_id: uid("bob"),
                conversation_id: cid("A"),
                is_typing: true,
            },
        );

        // when (操作):
        store.teardown();

        // then (期待する結果):
        assert!(store.typing_users(&cid("A")).is_empty());
        assert!(store.inner.lock_state().seen_messages.is_empty());
        assert_eq!(connection.bus().listener_count(EventKind::NewMessage), 0);
    }
}
