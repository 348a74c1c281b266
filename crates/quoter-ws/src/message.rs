//! JSON-RPC message model.
//!
//! Outgoing: `{"method": "...", "params": {...}, "id": N}`.
//! Incoming, one of:
//! - channel notification `{"channel_name": "...", "notification": ...}`
//! - error `{"id": N, "error": {"code": C, "message": "..."}}`
//! - result `{"id": N, "result": ...}`

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::WsResult;

/// RPC methods used by the quoter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Login,
    SetCancelOnDisconnect,
    PrivateSubscribe,
    PublicSubscribe,
    Ticker,
    AccountSummary,
    OpenOrders,
    Insert,
    Amend,
    Cancel,
    CancelAll,
    CancelSession,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "public/login",
            Self::SetCancelOnDisconnect => "private/set_cancel_on_disconnect",
            Self::PrivateSubscribe => "private/subscribe",
            Self::PublicSubscribe => "public/subscribe",
            Self::Ticker => "public/ticker",
            Self::AccountSummary => "private/account_summary",
            Self::OpenOrders => "private/open_orders",
            Self::Insert => "private/insert",
            Self::Amend => "private/amend",
            Self::Cancel => "private/cancel",
            Self::CancelAll => "private/cancel_all",
            Self::CancelSession => "private/cancel_session",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub method: &'static str,
    pub params: serde_json::Value,
    pub id: u64,
}

/// Channel notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub channel_name: String,
    pub notification: serde_json::Value,
}

/// Error body of a failed request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

impl RpcError {
    /// The venue no longer knows the order we referenced.
    pub fn is_order_not_found(&self) -> bool {
        self.message.to_lowercase().contains("order not found")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorResponse {
    #[serde(default)]
    pub id: Option<u64>,
    pub error: RpcError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResult {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: serde_json::Value,
}

/// Incoming WebSocket message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    Notification(Notification),
    Error(RpcErrorResponse),
    Result(RpcResult),
}

impl WsMessage {
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Notification(_) => None,
            Self::Error(e) => e.id,
            Self::Result(r) => r.id,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Notification(n) => Some(&n.channel_name),
            _ => None,
        }
    }
}

/// Session state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connected and session setup sent.
    Up,
    /// Connection lost or closed.
    Down,
}

/// Everything the connection forwards downstream, in arrival order.
#[derive(Debug, Clone)]
pub enum WsEvent {
    Session(SessionEvent),
    Message(WsMessage),
}

/// A request awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub method: Method,
    /// Caller tag, e.g. the client order id the request refers to.
    pub tag: Option<String>,
    pub sent_at: Instant,
}

/// Assigns request ids and remembers what each id was for.
#[derive(Debug)]
pub struct RequestTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request and serialize it.
    pub fn request(
        &self,
        method: Method,
        params: serde_json::Value,
        tag: Option<String>,
    ) -> WsResult<(u64, String)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&RpcRequest {
            method: method.as_str(),
            params,
            id,
        })?;
        self.pending.lock().insert(
            id,
            PendingRequest {
                method,
                tag,
                sent_at: Instant::now(),
            },
        );
        Ok((id, text))
    }

    /// Take the request a response belongs to.
    pub fn resolve(&self, id: u64) -> Option<PendingRequest> {
        self.pending.lock().remove(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every outstanding request. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.len();
        pending.clear();
        n
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_notification() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"channel_name":"session.orders","notification":[{"status":"open"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.channel(), Some("session.orders"));
        assert_eq!(msg.id(), None);
    }

    #[test]
    fn test_parse_result() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"id":7,"result":{"best_bid_price":1.0}}"#).unwrap();
        match msg {
            WsMessage::Result(r) => {
                assert_eq!(r.id, Some(7));
                assert_eq!(r.result["best_bid_price"], json!(1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_null_result() {
        let msg: WsMessage = serde_json::from_str(r#"{"id":3,"result":null}"#).unwrap();
        assert!(matches!(msg, WsMessage::Result(_)));
    }

    #[test]
    fn test_parse_error() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"id":9,"error":{"code":1,"message":"Order not found"}}"#,
        )
        .unwrap();
        match msg {
            WsMessage::Error(e) => {
                assert_eq!(e.id, Some(9));
                assert!(e.error.is_order_not_found());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_shape_fails() {
        assert!(serde_json::from_str::<WsMessage>(r#"{"foo":1}"#).is_err());
    }

    #[test]
    fn test_tracker_round_trip() {
        let tracker = RequestTracker::new();
        let (id, text) = tracker
            .request(Method::Cancel, json!({"client_order_id": 42}), Some("42".into()))
            .unwrap();

        let sent: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sent["method"], "private/cancel");
        assert_eq!(sent["id"], id);
        assert_eq!(sent["params"]["client_order_id"], 42);

        assert_eq!(tracker.pending_count(), 1);
        let pending = tracker.resolve(id).unwrap();
        assert_eq!(pending.method, Method::Cancel);
        assert_eq!(pending.tag.as_deref(), Some("42"));
        assert!(tracker.resolve(id).is_none());
    }

    #[test]
    fn test_tracker_ids_are_unique_and_clearable() {
        let tracker = RequestTracker::new();
        let (a, _) = tracker.request(Method::Ticker, json!({}), None).unwrap();
        let (b, _) = tracker.request(Method::Ticker, json!({}), None).unwrap();
        assert_ne!(a, b);
        assert_eq!(tracker.clear(), 2);
        assert_eq!(tracker.pending_count(), 0);
    }
}
