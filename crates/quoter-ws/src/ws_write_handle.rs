//! Write handle for outbound requests.
//!
//! Fire-and-forget: `send` registers the request id with the shared
//! [`RequestTracker`] and queues the text. The response arrives later on
//! the event stream and is matched back by id.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::ConnectionState;
use crate::message::{Method, RequestTracker};

/// Outbound frame.
#[derive(Debug)]
pub enum WsOutbound {
    /// Raw text.
    Text(String),
    /// Tracked JSON-RPC request.
    Request { id: u64, payload: String },
}

/// Why a request could not be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    NotConnected,
    ChannelClosed,
    Encode(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::Encode(e) => write!(f, "encode failed: {e}"),
        }
    }
}

impl std::error::Error for SendError {}

/// Cloneable, reconnect-safe sender.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsOutbound>,
    state: Arc<RwLock<ConnectionState>>,
    tracker: Arc<RequestTracker>,
}

impl WsWriteHandle {
    pub fn new(
        tx: mpsc::Sender<WsOutbound>,
        state: Arc<RwLock<ConnectionState>>,
        tracker: Arc<RequestTracker>,
    ) -> Self {
        Self { tx, state, tracker }
    }

    /// Queue a request. Returns its id.
    pub async fn send(
        &self,
        method: Method,
        params: serde_json::Value,
        tag: Option<String>,
    ) -> Result<u64, SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }

        let (id, payload) = self
            .tracker
            .request(method, params, tag)
            .map_err(|e| SendError::Encode(e.to_string()))?;

        if self.tx.send(WsOutbound::Request { id, payload }).await.is_err() {
            self.tracker.resolve(id);
            return Err(SendError::ChannelClosed);
        }
        debug!(id, method = %method, "Request queued");
        Ok(id)
    }

    /// Queue raw text.
    pub async fn send_text(&self, text: String) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.tx
            .send(WsOutbound::Text(text))
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    pub fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionState::Connected && !self.tx.is_closed()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_handle(
        state: ConnectionState,
    ) -> (WsWriteHandle, mpsc::Receiver<WsOutbound>, Arc<RequestTracker>) {
        let (tx, rx) = mpsc::channel(16);
        let tracker = Arc::new(RequestTracker::new());
        let handle = WsWriteHandle::new(tx, Arc::new(RwLock::new(state)), tracker.clone());
        (handle, rx, tracker)
    }

    #[tokio::test]
    async fn test_send_registers_and_queues() {
        let (handle, mut rx, tracker) = create_test_handle(ConnectionState::Connected);

        let id = handle
            .send(Method::Insert, json!({"price": 1}), Some("77".into()))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            WsOutbound::Request { id: sent, payload } => {
                assert_eq!(sent, id);
                assert!(payload.contains("private/insert"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tracker.resolve(id).unwrap().tag.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_send_when_disconnected() {
        let (handle, _rx, tracker) = create_test_handle(ConnectionState::Reconnecting);
        let result = handle.send(Method::Ticker, json!({}), None).await;
        assert_eq!(result, Err(SendError::NotConnected));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_state_follows_manager() {
        let (tx, _rx) = mpsc::channel(16);
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let handle = WsWriteHandle::new(tx, state.clone(), Arc::new(RequestTracker::new()));
        assert_eq!(handle.connection_state(), ConnectionState::Connecting);
        assert!(!handle.is_connected());

        *state.write() = ConnectionState::Connected;
        assert_eq!(handle.connection_state(), ConnectionState::Connected);
        assert!(handle.is_connected());
        handle.send_text("ping".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_on_closed_channel_is_refused() {
        let (handle, rx, tracker) = create_test_handle(ConnectionState::Connected);
        drop(rx);
        let result = handle.send(Method::Ticker, json!({}), None).await;
        assert_eq!(result, Err(SendError::NotConnected));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_text() {
        let (handle, mut rx, _) = create_test_handle(ConnectionState::Connected);
        handle.send_text("hello".to_string()).await.unwrap();
        assert!(matches!(rx.recv().await, Some(WsOutbound::Text(t)) if t == "hello"));
    }
}
