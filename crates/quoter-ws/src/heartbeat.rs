//! Heartbeat supervision.
//!
//! Tracks inbound activity and ping/pong timing. A ping is due once the
//! connection has been quiet for `interval`; the connection is considered
//! dead when a pong does not arrive within `timeout` of the ping.

use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct HeartbeatState {
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    last_message: Instant,
    waiting_for_pong: bool,
}

/// Heartbeat manager for one connection.
#[derive(Debug)]
pub struct HeartbeatManager {
    interval: Duration,
    timeout: Duration,
    state: RwLock<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: RwLock::new(HeartbeatState {
                last_ping: None,
                last_pong: None,
                last_message: Instant::now(),
                waiting_for_pong: false,
            }),
        }
    }

    /// Reset on (re)connection.
    pub fn reset(&self) {
        let mut s = self.state.write();
        s.last_ping = None;
        s.last_pong = None;
        s.last_message = Instant::now();
        s.waiting_for_pong = false;
    }

    pub fn record_ping(&self) {
        let mut s = self.state.write();
        s.last_ping = Some(Instant::now());
        s.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Instant::now();
        let mut s = self.state.write();
        s.last_pong = Some(now);
        s.waiting_for_pong = false;
        if let Some(ping) = s.last_ping {
            debug!(rtt_ms = now.duration_since(ping).as_millis() as u64, "Pong");
        }
    }

    /// Any inbound frame counts as liveness.
    pub fn record_message(&self) {
        self.state.write().last_message = Instant::now();
    }

    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Instant::now())
    }

    fn is_timed_out_at(&self, now: Instant) -> bool {
        let s = self.state.read();
        match (s.waiting_for_pong, s.last_ping) {
            (true, Some(ping)) => now.saturating_duration_since(ping) > self.timeout,
            _ => false,
        }
    }

    pub fn should_send_heartbeat(&self) -> bool {
        self.should_send_heartbeat_at(Instant::now())
    }

    fn should_send_heartbeat_at(&self, now: Instant) -> bool {
        let s = self.state.read();
        !s.waiting_for_pong && now.saturating_duration_since(s.last_message) >= self.interval
    }

    /// Sleep until the next check is due.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(self.interval / 2).await;
    }
}
