//! Session error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    /// Gave up connecting.
    #[error("Session failed: {0}")]
    ConnectionFailed(String),

    #[error("Closed by exchange: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("No pong within the heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Transport error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Request encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
