//! Real-time messaging synchronization engine.
//!
//! - `connection`: the single transport link, reconnect backoff and the typed
//!   event bus
//! - `store`: conversations and messages reconciled from server events
//! - `session`: ties `connect`/`disconnect` to the sign-in state
//! - `infrastructure`: wire DTOs and the WebSocket transport
//! - `ui`: terminal client used by the `chatsync-client` binary

pub mod connection;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod session;
pub mod store;
pub mod ui;

pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, EventKind};
pub use error::{ClientError, ConnectionError, StoreError, SyncError, TransportError};
pub use session::{SessionBinding, SessionState};
pub use store::{StoreConfig, StoreSnapshot, SyncStore};
