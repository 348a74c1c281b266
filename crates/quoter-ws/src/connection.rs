//! WebSocket connection manager.
//!
//! Owns the socket, reconnects with exponential backoff plus jitter, sends
//! the session setup requests after every (re)connect and forwards
//! everything downstream as [`WsEvent`]s:
//!
//! ```text
//! connect ─► setup (login, cancel-on-disconnect, subscribe) ─► Session(Up)
//!         ─► Message(..)* ─► Session(Down) ─► backoff ─► connect ...
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{Method, RequestTracker, SessionEvent, WsEvent, WsMessage};
use crate::ws_write_handle::{WsOutbound, WsWriteHandle};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    /// Maximum consecutive failed connections (0 = retry forever).
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Quiet time after which a ping is sent.
    pub heartbeat_interval_ms: u64,
    /// A pong must arrive within this after a ping.
    pub heartbeat_timeout_ms: u64,
    /// Pre-issued session token for `public/login`. Private channels and
    /// order entry need it.
    pub login_token: Option<String>,
    /// Venue-side cancel of our orders if the socket drops.
    pub cancel_on_disconnect_secs: Option<u64>,
    pub private_channels: Vec<String>,
    pub public_channels: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            heartbeat_interval_ms: 20000,
            heartbeat_timeout_ms: 10000,
            login_token: None,
            cancel_on_disconnect_secs: None,
            private_channels: Vec::new(),
            public_channels: Vec::new(),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: HeartbeatManager,
    tracker: Arc<RequestTracker>,
    event_tx: mpsc::Sender<WsEvent>,
    reconnect_count: AtomicU32,
    outbound_tx: mpsc::Sender<WsOutbound>,
    outbound_rx: TokioMutex<mpsc::Receiver<WsOutbound>>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        event_tx: mpsc::Sender<WsEvent>,
        tracker: Arc<RequestTracker>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let heartbeat =
            HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            heartbeat,
            tracker,
            event_tx,
            reconnect_count: AtomicU32::new(0),
            outbound_tx,
            outbound_rx: TokioMutex::new(outbound_rx),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cloneable sender sharing this connection's tracker.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(
            self.outbound_tx.clone(),
            self.state.clone(),
            self.tracker.clone(),
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed connection attempts.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown. Queued requests are flushed before the
    /// close frame.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and keep reconnecting until shutdown or the attempt limit.
    pub async fn connect(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            let mut went_up = false;
            match self.try_connect(&mut went_up).await {
                Ok(()) => info!("WebSocket connection closed"),
                Err(e) => error!(?e, "WebSocket connection error"),
            }

            if went_up {
                attempt = 0;
                let dropped = self.tracker.clear();
                if dropped > 0 {
                    warn!(dropped, "Dropped requests without response");
                }
                self.emit(WsEvent::Session(SessionEvent::Down)).await;
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            attempt += 1;
            self.reconnect_count.store(attempt, Ordering::Relaxed);

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                *self.state.write() = ConnectionState::Disconnected;
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;
            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self, went_up: &mut bool) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        // Requests queued while we were down refer to a dead session.
        self.drain_stale_outbound().await;

        *self.state.write() = ConnectionState::Connected;
        self.reconnect_count.store(0, Ordering::Relaxed);
        self.heartbeat.reset();
        info!("WebSocket connected");

        self.send_session_setup(&mut write).await?;
        *went_up = true;
        self.emit(WsEvent::Session(SessionEvent::Up)).await;

        let result = self.message_loop(&mut write, &mut read).await;
        *self.state.write() = ConnectionState::Disconnected;
        result
    }

    async fn message_loop(
        &self,
        write: &mut WsSink,
        read: &mut futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    ) -> WsResult<()> {
        let mut outbound_rx = self.outbound_rx.lock().await;

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    while let Ok(out) = outbound_rx.try_recv() {
                        if let Err(e) = write.send(Message::Text(out.into_text())).await {
                            warn!(?e, "Failed to flush request during shutdown");
                            break;
                        }
                    }
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text_message(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_message();
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                Some(out) = outbound_rx.recv() => {
                    if let WsOutbound::Request { id, .. } = &out {
                        debug!(id, "Request sent");
                    }
                    write.send(Message::Text(out.into_text())).await?;
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_heartbeat() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str) {
        self.heartbeat.record_message();
        match serde_json::from_str::<WsMessage>(text) {
            Ok(msg) => self.emit(WsEvent::Message(msg)).await,
            Err(e) => warn!(error = %e, raw = %text, "Unrecognized message"),
        }
    }

    async fn send_session_setup(&self, write: &mut WsSink) -> WsResult<()> {
        let mut requests = Vec::new();
        if let Some(token) = &self.config.login_token {
            requests.push((Method::Login, json!({ "token": token })));
        }
        if let Some(secs) = self.config.cancel_on_disconnect_secs {
            requests.push((Method::SetCancelOnDisconnect, json!({ "timeout_secs": secs })));
        }
        if !self.config.private_channels.is_empty() {
            requests.push((
                Method::PrivateSubscribe,
                json!({ "channels": self.config.private_channels }),
            ));
        }
        if !self.config.public_channels.is_empty() {
            requests.push((
                Method::PublicSubscribe,
                json!({ "channels": self.config.public_channels }),
            ));
        }

        for (method, params) in requests {
            let (id, text) = self.tracker.request(method, params, None)?;
            write.send(Message::Text(text)).await?;
            debug!(id, method = %method, "Session setup sent");
        }
        Ok(())
    }

    async fn drain_stale_outbound(&self) {
        let mut rx = self.outbound_rx.lock().await;
        let mut dropped = 0usize;
        while let Ok(out) = rx.try_recv() {
            if let WsOutbound::Request { id, .. } = out {
                self.tracker.resolve(id);
            }
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Discarded requests queued while disconnected");
        }
    }

    async fn emit(&self, event: WsEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("Event receiver dropped");
        }
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self
            .config
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.reconnect_max_delay_ms);
        Duration::from_millis(delay + rand_jitter())
    }
}

impl WsOutbound {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Request { payload, .. } => payload,
        }
    }
}

/// Jitter in [0, 1000) ms.
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: ConnectionConfig) -> ConnectionManager {
        let (tx, _rx) = mpsc::channel(8);
        ConnectionManager::new(config, tx, Arc::new(RequestTracker::new()))
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert!(config.login_token.is_none());
        assert!(config.private_channels.is_empty());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let m = manager(ConnectionConfig {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 1000,
            ..Default::default()
        });
        let first = m.calculate_backoff_delay(1).as_millis() as u64;
        let third = m.calculate_backoff_delay(3).as_millis() as u64;
        let tenth = m.calculate_backoff_delay(10).as_millis() as u64;
        assert!((100..1100).contains(&first));
        assert!((400..1400).contains(&third));
        assert!((1000..2000).contains(&tenth));
    }

    #[test]
    fn test_initial_state() {
        let m = manager(ConnectionConfig::default());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.write_handle().is_connected());
        assert!(!m.is_shutdown());
        m.shutdown();
        assert!(m.is_shutdown());
    }
}
