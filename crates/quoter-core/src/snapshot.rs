//! Market/account snapshot consumed by one quoting tick.
//!
//! A `Snapshot` is immutable once published. Feeds produce new snapshots
//! by copying the latest one and overwriting the fields they own.

use crate::decimal::Price;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};

/// Top-of-book state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    /// Both sides known and `bid <= ask`.
    Valid,
    /// At least one side unknown.
    OneSided,
    /// `bid > ask`.
    Crossed,
}

impl std::fmt::Display for BookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::OneSided => write!(f, "ONE_SIDED"),
            Self::Crossed => write!(f, "CROSSED"),
        }
    }
}

/// One consistent view of everything the quoting engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// Signed position; `None` until the first portfolio update.
    pub position: Option<Decimal>,
    /// Latest volatility scalar (>= 0, unclamped).
    pub volatility: Decimal,
    /// Fees paid so far (quote currency).
    pub fees_paid: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    /// When the top of book was last updated.
    pub timestamp: Option<Instant>,
    /// Whether the streaming session is currently up.
    pub session_up: bool,
    /// Monotonic publish counter.
    pub version: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            best_bid: None,
            best_ask: None,
            position: None,
            volatility: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            realized_pnl: None,
            unrealized_pnl: None,
            timestamp: None,
            session_up: false,
            version: 0,
        }
    }
}

impl Snapshot {
    /// Top-of-book state.
    pub fn book_state(&self) -> BookState {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) if bid <= ask => BookState::Valid,
            (Some(_), Some(_)) => BookState::Crossed,
            _ => BookState::OneSided,
        }
    }

    /// Mid price, defined only when the book is valid.
    pub fn mid(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) if bid <= ask => Some(Price::mid(bid, ask)),
            _ => None,
        }
    }

    /// Age of the top of book at `now`.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.timestamp.map(|ts| now.saturating_duration_since(ts))
    }

    /// True when the session is down, the book was never seen, or it is
    /// older than `max_age`.
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        if !self.session_up {
            return true;
        }
        match self.age(now) {
            Some(age) => age > max_age,
            None => true,
        }
    }
}

/// PnL figures reported by the exchange account summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountSummary {
    pub unrealized_pnl: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
}
