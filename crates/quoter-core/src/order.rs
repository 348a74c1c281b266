//! Order-related types and identifiers.
//!
//! Quote sides, client order ids, order status, working orders and the
//! fill / order-update events that flow back from the exchange.

use crate::decimal::{Price, Size};
use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Quote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Bid, Side::Ask];

    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Position delta per unit filled: +1 for bid, -1 for ask.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Bid => Decimal::ONE,
            Self::Ask => Decimal::NEGATIVE_ONE,
        }
    }

    /// Exchange direction string.
    pub fn direction(&self) -> &'static str {
        match self {
            Self::Bid => "buy",
            Self::Ask => "sell",
        }
    }

    /// Array index for per-side storage.
    pub fn index(&self) -> usize {
        match self {
            Self::Bid => 0,
            Self::Ask => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

impl FromStr for Side {
    type Err = CoreError;

    /// Accepts both quote-side names and exchange directions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bid" | "buy" => Ok(Self::Bid),
            "ask" | "sell" => Ok(Self::Ask),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Client order id.
///
/// Opaque to the quoting core. Ids produced by [`OrderIdGenerator`] are
/// decimal integers so they can be sent as numeric client ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form, if the id is a decimal integer.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generates unique client order ids for one process.
///
/// Seeded from wall-clock milliseconds so ids do not collide with orders
/// left over from a previous run of the same label.
#[derive(Debug)]
pub struct OrderIdGenerator {
    next: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new() -> Self {
        let seed = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::starting_at(seed.saturating_mul(10))
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> OrderId {
        OrderId(self.next.fetch_add(1, Ordering::Relaxed).to_string())
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle status of a working order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted, not yet acknowledged.
    Pending,
    /// Resting on the book (possibly partially filled).
    Open,
    Cancelled,
    Filled,
    Rejected,
}

impl OrderStatus {
    /// Whether the order can no longer trade.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Filled | Self::Rejected)
    }

    /// Map an exchange status string.
    ///
    /// Unknown strings return `None` so callers can log and skip them.
    pub fn from_exchange(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "open" | "partially_filled" => Some(Self::Open),
            "filled" => Some(Self::Filled),
            "cancelled" | "cancelled_partially_filled" => Some(Self::Cancelled),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Cancelled => "cancelled",
            Self::Filled => "filled",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// A working order as known locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Remaining (unfilled) size.
    pub size: Size,
    pub status: OrderStatus,
    /// A cancel has been sent and not yet acknowledged.
    pub cancel_in_flight: bool,
}

impl Order {
    /// A freshly submitted order.
    pub fn pending(id: OrderId, side: Side, price: Price, size: Size) -> Self {
        Self {
            id,
            side,
            price,
            size,
            status: OrderStatus::Pending,
            cancel_in_flight: false,
        }
    }

    /// Whether the order still counts as a working order for its side.
    pub fn is_working(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// A fill of one of our orders.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
    /// Fee paid in quote currency (negative for rebates).
    pub fee: Decimal,
    pub received_at: Instant,
}

impl Fill {
    /// Signed position change caused by this fill.
    pub fn position_delta(&self) -> Decimal {
        self.side.sign() * self.size.inner()
    }
}

/// Status feedback for one order, from the exchange or a simulated venue.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub side: Option<Side>,
    pub price: Option<Price>,
    /// Remaining size after this update, when reported.
    pub remaining: Option<Size>,
    /// Set when the update carries a (partial) fill.
    pub fill: Option<Fill>,
}

impl OrderUpdate {
    /// An update that only changes status.
    pub fn status(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            side: None,
            price: None,
            remaining: None,
            fill: None,
        }
    }
}
