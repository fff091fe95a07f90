//! Binds the connection lifecycle to the application's sign-in state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::{
    connection::{ConnectionEvent, ConnectionManager, EventKind, Subscription},
    domain::UserId,
    error::ConnectionError,
};

/// What the authentication collaborator currently knows about the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user_id: Option<UserId>,
    pub token: Option<String>,
}

impl SessionState {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            user_id: Some(user_id),
            token: Some(token.into()),
        }
    }

    /// Both "is authenticated" and "has a session user".
    pub fn is_active(&self) -> bool {
        self.is_authenticated && self.user_id.is_some()
    }
}

#[derive(Default)]
struct Tracking {
    token: Option<String>,
    /// Set once per transition into an active session; guards against
    /// concurrent connects.
    bound: bool,
    connected: bool,
}

struct BindingInner {
    connection: ConnectionManager,
    server_url: String,
    tracking: Mutex<Tracking>,
}

impl BindingInner {
    fn lock(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_connect(&self) {
        let token = {
            let mut tracking = self.lock();
            tracking.connected = true;
            tracking.token.clone()
        };

        let Some(token) = token else {
            tracing::warn!("Connected without a session token; skipping authentication");
            return;
        };
        match self.connection.authenticate(&token) {
            Ok(()) => tracing::debug!("Authentication handshake sent"),
            Err(e) => tracing::warn!("Failed to authenticate: {}", e),
        }
    }
}

/// Owns the connection manager and drives `connect`/`disconnect` from
/// session transitions.
pub struct SessionBinding {
    inner: Arc<BindingInner>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for SessionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBinding")
            .field("server_url", &self.inner.server_url)
            .field("is_connected", &self.is_connected())
            .finish()
    }
}

impl SessionBinding {
    pub fn new(connection: ConnectionManager, server_url: impl Into<String>) -> Self {
        let inner = Arc::new(BindingInner {
            connection,
            server_url: server_url.into(),
            tracking: Mutex::new(Tracking::default()),
        });

        let weak = Arc::downgrade(&inner);
        let on_connect = inner.connection.on(EventKind::Connect, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connect();
            }
        });

        let weak = Arc::downgrade(&inner);
        let on_disconnect = inner.connection.on(EventKind::Disconnect, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.lock().connected = false;
            }
        });

        let on_auth_error = inner
            .connection
            .on(EventKind::AuthenticationError, |event| {
                if let ConnectionEvent::AuthenticationError { message } = event {
                    tracing::error!("Server rejected the session token: {}", message);
                }
            });

        Self {
            inner,
            subscriptions: Mutex::new(vec![on_connect, on_disconnect, on_auth_error]),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    /// Whether the last lifecycle event seen was `connect`.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Apply one observation of the session.
    ///
    /// The token is always refreshed so reconnects authenticate with the
    /// latest credential. Entering an active session connects once; leaving
    /// the authenticated state disconnects.
    pub async fn update(&self, session: &SessionState) -> Result<(), ConnectionError> {
        let should_connect = {
            let mut tracking = self.inner.lock();
            if session.token.is_some() {
                tracking.token = session.token.clone();
            }

            if !session.is_authenticated {
                if !tracking.bound {
                    return Ok(());
                }
                *tracking = Tracking::default();
                drop(tracking);
                tracing::info!("Session ended; disconnecting");
                self.inner.connection.disconnect();
                return Ok(());
            }

            let should_connect = session.is_active() && !tracking.bound;
            if should_connect {
                tracking.bound = true;
            }
            should_connect
        };

        if !should_connect {
            return Ok(());
        }
        tracing::info!(
            "Session started for {}; connecting",
            session.user_id.as_ref().map(UserId::as_str).unwrap_or_default()
        );
        self.inner.connection.connect(&self.inner.server_url).await
    }

    /// Follow `sessions` until the sender is dropped, then disconnect.
    pub async fn run(&self, mut sessions: watch::Receiver<SessionState>) {
        loop {
            let session = sessions.borrow_and_update().clone();
            if let Err(e) = self.update(&session).await {
                // Backoff owns retries from here.
                tracing::warn!("Connect failed: {}", e);
            }
            if sessions.changed().await.is_err() {
                break;
            }
        }

        tracing::debug!("Session source closed");
        self.update(&SessionState::signed_out()).await.ok();
    }

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
    }
}

impl Drop for SessionBinding {
    fn drop(&mut self) {
        self.teardown();
    }
}
