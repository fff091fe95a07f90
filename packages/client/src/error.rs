//! Error types for the synchronization engine.

use std::time::Duration;

use thiserror::Error;

/// Low-level transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport could not establish a session
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// The transport did not acknowledge the connection in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned by the connection manager to the immediate caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// A data command was issued while not connected
    #[error("Not connected to the messaging server")]
    NotConnected,

    /// `authenticate` was called with an empty token
    #[error("Authentication token must not be empty")]
    EmptyToken,

    /// Opening the transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An outbound payload could not be encoded
    #[error("Failed to encode outbound payload: {0}")]
    Encode(String),
}

/// Errors returned by store commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Most recent non-fatal error surfaced in the store's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The server dispatched an `error` event
    #[error("Server error: {0}")]
    Server(String),

    /// A snapshot load failed (command rejected or `success=false`)
    #[error("Load failed: {0}")]
    Load(String),
}

/// A command that could not be issued leaves its load unfulfilled.
impl From<&ConnectionError> for SyncError {
    fn from(error: &ConnectionError) -> Self {
        SyncError::Load(error.to_string())
    }
}

/// Terminal client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The line editor could not be initialised
    #[error("Failed to initialize the terminal prompt: {0}")]
    Terminal(String),
}
