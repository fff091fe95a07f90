//! Scripted in-memory transport for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use super::{LinkPeer, Transport, TransportLink};
use crate::error::TransportError;

/// Hands out pre-scripted results in order; fails once the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportLink, TransportError>>>,
    opened: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful open and return the server side of the link.
    pub fn push_link(&self) -> LinkPeer {
        let (link, peer) = TransportLink::pair();
        self.script.lock().unwrap().push_back(Ok(link));
        peer
    }

    pub fn push_failure(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _url: &str) -> Result<TransportLink, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::ConnectFailed("connection refused".to_string())))
    }
}
