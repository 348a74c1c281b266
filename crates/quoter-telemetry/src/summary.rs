//! Periodic state summary.
//!
//! A flat, serializable picture of the quoter at one instant, logged every
//! `log_interval` so an operator can follow the bot without scraping
//! metrics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::error::TelemetryResult;

/// Working order as shown in the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateSummary {
    pub session_up: bool,
    pub recovering: bool,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub position: Option<Decimal>,
    pub volatility: Decimal,
    pub bid_phase: String,
    pub ask_phase: String,
    pub bid_order: Option<OrderView>,
    pub ask_order: Option<OrderView>,
    pub fees_paid: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Option<Decimal>,
    pub bid_fills: u64,
    pub ask_fills: u64,
    pub volume: Decimal,
}

impl StateSummary {
    /// Realized minus fees plus unrealized (when known).
    pub fn net_pnl(&self) -> Decimal {
        self.realized_pnl - self.fees_paid + self.unrealized_pnl.unwrap_or(Decimal::ZERO)
    }

    pub fn to_json(&self) -> TelemetryResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Logs summaries with the run's uptime.
pub struct SummaryReporter {
    instrument: String,
    start_time: DateTime<Utc>,
}

impl SummaryReporter {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            start_time: Utc::now(),
        }
    }

    /// Uptime as `HHh MMm SSs`.
    pub fn uptime(&self, now: DateTime<Utc>) -> String {
        let elapsed = now - self.start_time;
        format!(
            "{:02}h {:02}m {:02}s",
            elapsed.num_hours(),
            elapsed.num_minutes() % 60,
            elapsed.num_seconds() % 60
        )
    }

    pub fn log(&self, s: &StateSummary) {
        info!(
            instrument = %self.instrument,
            uptime = %self.uptime(Utc::now()),
            session_up = s.session_up,
            recovering = s.recovering,
            "---------- State summary ----------"
        );
        info!(
            bid = %opt(s.best_bid),
            ask = %opt(s.best_ask),
            mid = %opt(s.mid),
            volatility = %s.volatility,
            "  Market"
        );
        info!(
            position = %opt(s.position),
            bid_phase = %s.bid_phase,
            ask_phase = %s.ask_phase,
            "  Inventory"
        );
        info!(
            bid = %order(&s.bid_order),
            ask = %order(&s.ask_order),
            "  Working orders"
        );
        info!(
            fees = %s.fees_paid,
            realized = %s.realized_pnl,
            unrealized = %opt(s.unrealized_pnl),
            net = %s.net_pnl(),
            bid_fills = s.bid_fills,
            ask_fills = s.ask_fills,
            volume = %s.volume,
            "  PnL"
        );
    }
}

fn opt(v: Option<Decimal>) -> String {
    v.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn order(o: &Option<OrderView>) -> String {
    match o {
        Some(o) => format!("{}@{} ({}, {})", o.size, o.price, o.id, o.status),
        None => "-".to_string(),
    }
}
