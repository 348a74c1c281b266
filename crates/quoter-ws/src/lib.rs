//! JSON-RPC WebSocket session.
//!
//! - Automatic reconnection with exponential backoff
//! - Session setup (login, cancel-on-disconnect, subscriptions) on every connect
//! - Ping/pong heartbeat supervision
//! - Request id tracking so responses can be matched to what was asked

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod ws_write_handle;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use message::{
    Method, Notification, PendingRequest, RequestTracker, RpcError, RpcErrorResponse, RpcResult,
    SessionEvent, WsEvent, WsMessage,
};
pub use ws_write_handle::{SendError, WsOutbound, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the TLS crypto provider. Call before the first connection.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
