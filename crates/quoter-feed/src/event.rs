//! Inbound feed events.
//!
//! The common currency between venue adapters and the quoting loop. The
//! live session parser and the paper exchange both produce these.

use std::time::Instant;

use quoter_core::{AccountSummary, Order, OrderId, OrderUpdate, Price, Side, Size};
use quoter_ws::{Method, RpcError};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Top of book. Either side may be missing.
    MarketTick {
        best_bid: Option<Price>,
        best_ask: Option<Price>,
        received_at: Instant,
    },
    /// Signed position in the quoted instrument.
    PositionUpdate { position: Decimal },
    /// Order status change, possibly carrying a fill.
    OrderUpdate(OrderUpdate),
    /// Public trade printed with our label.
    Trade {
        side: Option<Side>,
        price: Price,
        size: Size,
    },
    AccountSummary(AccountSummary),
    /// Authoritative list of our working orders.
    OpenOrders(Vec<Order>),
    CancelAllAck,
    /// A request failed.
    ExchangeError {
        method: Option<Method>,
        order_id: Option<OrderId>,
        error: RpcError,
    },
}

impl FeedEvent {
    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MarketTick { .. } => "market_tick",
            Self::PositionUpdate { .. } => "position_update",
            Self::OrderUpdate(_) => "order_update",
            Self::Trade { .. } => "trade",
            Self::AccountSummary(_) => "account_summary",
            Self::OpenOrders(_) => "open_orders",
            Self::CancelAllAck => "cancel_all_ack",
            Self::ExchangeError { .. } => "exchange_error",
        }
    }
}
