//! Prometheus metrics for the quoter.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means a duplicate metric
//! name, which is a build defect and only surfaces during static
//! initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_int_counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, IntCounter,
    TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Streaming session state (1 = up).
pub static SESSION_UP: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("quoter_session_up", "Streaming session state (1=up)").unwrap()
});

/// Total reconnections of the streaming session.
pub static RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "quoter_reconnect_total",
        "Total streaming session reconnections"
    )
    .unwrap()
});

/// Decoded feed events.
/// Labels: kind
pub static FEED_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoter_feed_events_total",
        "Decoded feed events",
        &["kind"]
    )
    .unwrap()
});

/// Quoted spread from mid in basis points.
/// Labels: side
pub static QUOTE_SPREAD_BPS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "quoter_quote_spread_bps",
        "Quoted spread from mid in basis points",
        &["side"]
    )
    .unwrap()
});

pub static QUOTE_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("quoter_quote_price", "Quoted price", &["side"]).unwrap()
});

pub static QUOTE_SIZE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("quoter_quote_size", "Quoted size (0 = not quoting)", &["side"]).unwrap()
});

/// Ticks where a side was not quoted.
/// Labels: side, reason
pub static NO_QUOTE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoter_no_quote_total",
        "Ticks where a side was not quoted",
        &["side", "reason"]
    )
    .unwrap()
});

/// Quotes suppressed by the output invariant check.
pub static INVARIANT_VIOLATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoter_invariant_violations_total",
        "Quotes suppressed by the output invariant check",
        &["side"]
    )
    .unwrap()
});

/// Commands sent to the executor.
/// Labels: kind (insert/amend/cancel/cancel_all)
pub static ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoter_actions_total",
        "Commands sent to the executor",
        &["kind"]
    )
    .unwrap()
});

/// Requests the exchange answered with an error.
/// Labels: method
pub static EXCHANGE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "quoter_exchange_errors_total",
        "Requests answered with an error",
        &["method"]
    )
    .unwrap()
});

pub static FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("quoter_fills_total", "Fills of our orders", &["side"]).unwrap()
});

/// Cooldown phase per side (0 = normal, 1 = cooldown, 2 = recovery).
pub static PHASE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "quoter_phase",
        "Cooldown phase (0=normal, 1=cooldown, 2=recovery)",
        &["side"]
    )
    .unwrap()
});

pub static POSITION: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("quoter_position", "Signed position").unwrap()
});

pub static VOLATILITY: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("quoter_volatility", "Volatility scalar in use").unwrap()
});

pub static FEES_TOTAL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("quoter_fees_total", "Fees paid (quote currency)").unwrap()
});

/// Labels: kind (realized/unrealized)
pub static PNL: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("quoter_pnl", "Profit and loss (quote currency)", &["kind"]).unwrap()
});

/// Wall time of one quoting tick in milliseconds.
pub static TICK_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "quoter_tick_duration_ms",
        "Quoting tick duration in milliseconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn session_up() {
        SESSION_UP.set(1.0);
    }

    pub fn session_down() {
        SESSION_UP.set(0.0);
    }

    pub fn reconnect() {
        RECONNECT_TOTAL.inc();
    }

    pub fn feed_event(kind: &str) {
        FEED_EVENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a quoted side.
    pub fn quote(side: &str, price: f64, size: f64, spread_bps: f64) {
        QUOTE_PRICE.with_label_values(&[side]).set(price);
        QUOTE_SIZE.with_label_values(&[side]).set(size);
        QUOTE_SPREAD_BPS.with_label_values(&[side]).set(spread_bps);
    }

    /// Record a side left unquoted this tick.
    pub fn no_quote(side: &str, reason: &str) {
        QUOTE_SIZE.with_label_values(&[side]).set(0.0);
        NO_QUOTE_TOTAL.with_label_values(&[side, reason]).inc();
    }

    pub fn invariant_violation(side: &str) {
        INVARIANT_VIOLATIONS_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn action(kind: &str) {
        ACTIONS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn exchange_error(method: &str) {
        EXCHANGE_ERRORS_TOTAL.with_label_values(&[method]).inc();
    }

    pub fn fill(side: &str) {
        FILLS_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn phase(side: &str, code: i64) {
        PHASE.with_label_values(&[side]).set(code as f64);
    }

    pub fn position(position: f64) {
        POSITION.set(position);
    }

    pub fn volatility(volatility: f64) {
        VOLATILITY.set(volatility);
    }

    /// Record bookkeeping totals. Missing PnL figures leave the gauge as is.
    pub fn bookkeeping(fees: f64, realized: Option<f64>, unrealized: Option<f64>) {
        FEES_TOTAL.set(fees);
        if let Some(v) = realized {
            PNL.with_label_values(&["realized"]).set(v);
        }
        if let Some(v) = unrealized {
            PNL.with_label_values(&["unrealized"]).set(v);
        }
    }

    pub fn tick_duration(ms: f64) {
        TICK_DURATION_MS.observe(ms);
    }

    /// Render all registered metrics in the text exposition format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
