//! Session message decoding.
//!
//! Turns channel notifications and request results into [`FeedEvent`]s.
//! Results are matched to what was asked through the shared
//! [`RequestTracker`]; a result whose id is unknown (already resolved, or
//! from before a reconnect) is dropped.
//!
//! Channels handled:
//! - `ticker.*`: `best_bid_price` / `best_ask_price`
//! - `account.portfolio`: position for our instrument
//! - `session.orders`: status updates; fills derived from `filled_amount`
//! - `trades`: prints carrying our label
//! - `account.summary`: `unrealised_pnl` / `session_realised_pnl`

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use quoter_core::{
    AccountSummary, Fill, Order, OrderId, OrderStatus, OrderUpdate, Price, Side, Size,
    BPS_DIVISOR,
};
use quoter_ws::{Method, Notification, RequestTracker, RpcErrorResponse, RpcResult, WsMessage};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{FeedError, FeedResult};
use crate::event::FeedEvent;

/// Terminal orders whose fill progress is still remembered, so a late
/// duplicate report does not produce a second fill.
const TERMINAL_MEMORY: usize = 256;

pub struct ThalexParser {
    instrument: String,
    label: String,
    fee_rate_bps: Decimal,
    tracker: Arc<RequestTracker>,
    filled_so_far: HashMap<OrderId, Decimal>,
    terminal: VecDeque<OrderId>,
}

impl ThalexParser {
    pub fn new(
        instrument: impl Into<String>,
        label: impl Into<String>,
        fee_rate_bps: Decimal,
        tracker: Arc<RequestTracker>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            label: label.into(),
            fee_rate_bps,
            tracker,
            filled_so_far: HashMap::new(),
            terminal: VecDeque::new(),
        }
    }

    /// Decode one message. Malformed parts are logged and skipped.
    pub fn handle(&mut self, msg: &WsMessage) -> Vec<FeedEvent> {
        match msg {
            WsMessage::Notification(n) => self.handle_notification(n),
            WsMessage::Result(r) => self.handle_result(r),
            WsMessage::Error(e) => vec![self.handle_error(e)],
        }
    }

    fn handle_notification(&mut self, n: &Notification) -> Vec<FeedEvent> {
        let channel = n.channel_name.as_str();
        let data = &n.notification;
        trace!(channel, "Notification");

        if channel.starts_with("ticker") {
            return self.decode_ticker(data).into_iter().collect();
        }
        match channel {
            "session.orders" => self.decode_order_list(data),
            "account.portfolio" => self.decode_portfolio(data).into_iter().collect(),
            "trades" => self.decode_trades(data),
            "account.summary" => vec![FeedEvent::AccountSummary(decode_account_summary(data))],
            _ => {
                debug!(channel, "Ignoring channel");
                Vec::new()
            }
        }
    }

    fn handle_result(&mut self, r: &RpcResult) -> Vec<FeedEvent> {
        let Some(id) = r.id else {
            debug!("Result without id");
            return Vec::new();
        };
        let Some(pending) = self.tracker.resolve(id) else {
            debug!(id, "Result for unknown request");
            return Vec::new();
        };
        let data = &r.result;

        match pending.method {
            Method::Ticker => self.decode_ticker(data).into_iter().collect(),
            Method::AccountSummary => vec![FeedEvent::AccountSummary(decode_account_summary(data))],
            Method::OpenOrders => vec![FeedEvent::OpenOrders(self.decode_open_orders(data))],
            Method::Insert | Method::Amend | Method::Cancel => self.decode_order_list(data),
            Method::CancelAll => vec![FeedEvent::CancelAllAck],
            method => {
                debug!(id, method = %method, "Request acknowledged");
                Vec::new()
            }
        }
    }

    fn handle_error(&mut self, e: &RpcErrorResponse) -> FeedEvent {
        let pending = e.id.and_then(|id| self.tracker.resolve(id));
        let method = pending.as_ref().map(|p| p.method);
        let order_id = pending.and_then(|p| p.tag).map(OrderId::from);

        warn!(
            id = ?e.id,
            method = ?method.map(|m| m.as_str()),
            order_id = ?order_id.as_ref().map(|o| o.as_str()),
            code = ?e.error.code,
            message = %e.error.message,
            "Request failed"
        );
        FeedEvent::ExchangeError {
            method,
            order_id,
            error: e.error.clone(),
        }
    }

    fn decode_ticker(&self, data: &Value) -> Option<FeedEvent> {
        let best_bid = field(data, "best_bid_price").map(Price::new);
        let best_ask = field(data, "best_ask_price").map(Price::new);
        if best_bid.is_none() && best_ask.is_none() {
            debug!("Ticker without touch");
            return None;
        }
        Some(FeedEvent::MarketTick {
            best_bid,
            best_ask,
            received_at: Instant::now(),
        })
    }

    /// The portfolio is a full list; an instrument missing from it is flat.
    fn decode_portfolio(&self, data: &Value) -> Option<FeedEvent> {
        let Some(entries) = data.as_array() else {
            warn!("Portfolio is not a list");
            return None;
        };
        let position = entries
            .iter()
            .find(|p| {
                p.get("instrument_name").and_then(Value::as_str) == Some(self.instrument.as_str())
            })
            .map(|p| field(p, "position").unwrap_or(Decimal::ZERO))
            .unwrap_or_else(|| {
                debug!(instrument = %self.instrument, "No portfolio entry, treating as flat");
                Decimal::ZERO
            });
        Some(FeedEvent::PositionUpdate { position })
    }

    fn decode_trades(&self, data: &Value) -> Vec<FeedEvent> {
        let trades = match data {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => data
                .get("trades")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        };

        trades
            .iter()
            .filter(|t| {
                let instrument = t
                    .get("instrument_name")
                    .or_else(|| t.get("instrument"))
                    .and_then(Value::as_str);
                instrument == Some(self.instrument.as_str())
                    && t.get("label").and_then(Value::as_str) == Some(self.label.as_str())
            })
            .filter_map(|t| {
                let price = field(t, "price")?;
                let size = field(t, "amount")?;
                let side = t
                    .get("direction")
                    .and_then(Value::as_str)
                    .and_then(|d| d.parse::<Side>().ok());
                Some(FeedEvent::Trade {
                    side,
                    price: Price::new(price),
                    size: Size::new(size),
                })
            })
            .collect()
    }

    fn decode_open_orders(&mut self, data: &Value) -> Vec<Order> {
        let Some(items) = data.as_array() else {
            warn!("Open orders result is not a list");
            return Vec::new();
        };

        let mut orders = Vec::new();
        for raw in items {
            if !self.is_ours(raw) {
                continue;
            }
            match self.decode_open_order(raw) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(error = %e, "Skipping open order"),
            }
        }
        orders
    }

    fn decode_open_order(&mut self, raw: &Value) -> FeedResult<Order> {
        let id = client_order_id(raw).ok_or(FeedError::MissingField("client_order_id"))?;
        let side = direction(raw)?;
        let price = field(raw, "price").ok_or(FeedError::MissingField("price"))?;
        let filled = field(raw, "filled_amount").unwrap_or(Decimal::ZERO);
        let remaining = remaining(raw, filled).ok_or(FeedError::MissingField("amount"))?;

        self.filled_so_far.insert(id.clone(), filled);
        Ok(Order {
            id,
            side,
            price: Price::new(price),
            size: Size::new(remaining),
            status: OrderStatus::Open,
            cancel_in_flight: false,
        })
    }

    fn is_ours(&self, raw: &Value) -> bool {
        let label_ok = raw.get("label").and_then(Value::as_str) == Some(self.label.as_str());
        let instrument_ok = raw
            .get("instrument_name")
            .and_then(Value::as_str)
            .map_or(true, |i| i == self.instrument);
        label_ok && instrument_ok
    }

    /// Orders arrive either as a list (channel) or a single object (result).
    fn decode_order_list(&mut self, data: &Value) -> Vec<FeedEvent> {
        let items = match data {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => std::slice::from_ref(data),
            _ => &[],
        };

        let mut events = Vec::new();
        for raw in items {
            match self.decode_order(raw) {
                Ok(Some(update)) => events.push(FeedEvent::OrderUpdate(update)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, raw = %raw, "Skipping order update"),
            }
        }
        events
    }

    fn decode_order(&mut self, raw: &Value) -> FeedResult<Option<OrderUpdate>> {
        if let Some(instrument) = raw.get("instrument_name").and_then(Value::as_str) {
            if instrument != self.instrument {
                return Ok(None);
            }
        }

        let order_id = client_order_id(raw).ok_or(FeedError::MissingField("client_order_id"))?;
        let status_str = raw
            .get("status")
            .and_then(Value::as_str)
            .ok_or(FeedError::MissingField("status"))?;
        let status = OrderStatus::from_exchange(status_str)
            .ok_or_else(|| FeedError::UnknownStatus(status_str.to_string()))?;
        let side = direction(raw).ok();
        let price = field(raw, "price").map(Price::new);

        let filled = field(raw, "filled_amount").or_else(|| {
            (status == OrderStatus::Filled)
                .then(|| field(raw, "amount"))
                .flatten()
        });
        let remaining = remaining(raw, filled.unwrap_or(Decimal::ZERO)).map(Size::new);

        let fill = match (filled, side) {
            (Some(total), Some(side)) => self.fill_delta(&order_id, side, total, raw, price)?,
            _ => None,
        };

        if status.is_terminal() {
            self.remember_terminal(order_id.clone());
        }

        debug!(
            order_id = %order_id,
            status = %status,
            filled = ?filled,
            "Order update"
        );
        Ok(Some(OrderUpdate {
            order_id,
            status,
            side,
            price,
            remaining,
            fill,
        }))
    }

    fn fill_delta(
        &mut self,
        order_id: &OrderId,
        side: Side,
        total_filled: Decimal,
        raw: &Value,
        limit_price: Option<Price>,
    ) -> FeedResult<Option<Fill>> {
        let previous = self
            .filled_so_far
            .get(order_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if total_filled <= previous {
            return Ok(None);
        }
        self.filled_so_far.insert(order_id.clone(), total_filled);

        let delta = total_filled - previous;
        let price = field(raw, "average_price")
            .filter(|p| p.is_sign_positive() && !p.is_zero())
            .map(Price::new)
            .or(limit_price)
            .ok_or(FeedError::MissingField("price"))?;
        let fee = (delta * price.inner() * self.fee_rate_bps / BPS_DIVISOR).abs();

        Ok(Some(Fill {
            order_id: order_id.clone(),
            side,
            price,
            size: Size::new(delta),
            fee,
            received_at: Instant::now(),
        }))
    }

    fn remember_terminal(&mut self, order_id: OrderId) {
        if self.terminal.contains(&order_id) {
            return;
        }
        self.terminal.push_back(order_id);
        while self.terminal.len() > TERMINAL_MEMORY {
            if let Some(old) = self.terminal.pop_front() {
                self.filled_so_far.remove(&old);
            }
        }
    }
}

fn decode_account_summary(data: &Value) -> AccountSummary {
    let body = data.get("result").unwrap_or(data);
    AccountSummary {
        unrealized_pnl: field(body, "unrealised_pnl"),
        realized_pnl: field(body, "session_realised_pnl"),
    }
}

/// Numeric field that may arrive as a JSON number or string.
fn field(obj: &Value, key: &str) -> Option<Decimal> {
    match obj.get(key)? {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn client_order_id(raw: &Value) -> Option<OrderId> {
    match raw.get("client_order_id")? {
        Value::Number(n) => Some(OrderId::new(n.to_string())),
        Value::String(s) => Some(OrderId::new(s.as_str())),
        _ => None,
    }
}

fn direction(raw: &Value) -> FeedResult<Side> {
    let d = raw
        .get("direction")
        .and_then(Value::as_str)
        .ok_or(FeedError::MissingField("direction"))?;
    d.parse()
        .map_err(|_| FeedError::ParseError(format!("Invalid direction: {d}")))
}

fn remaining(raw: &Value, filled: Decimal) -> Option<Decimal> {
    field(raw, "remaining_amount")
        .or_else(|| field(raw, "amount").map(|a| (a - filled).max(Decimal::ZERO)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn parser() -> (ThalexParser, Arc<RequestTracker>) {
        let tracker = Arc::new(RequestTracker::new());
        let parser = ThalexParser::new("BTC-PERPETUAL", "quoter", dec!(2.5), tracker.clone());
        (parser, tracker)
    }

    fn notification(channel: &str, data: Value) -> WsMessage {
        serde_json::from_value(json!({"channel_name": channel, "notification": data})).unwrap()
    }

    fn result(id: u64, data: Value) -> WsMessage {
        serde_json::from_value(json!({"id": id, "result": data})).unwrap()
    }

    fn order(cid: u64, status: &str, filled: f64) -> Value {
        json!({
            "client_order_id": cid,
            "instrument_name": "BTC-PERPETUAL",
            "direction": "buy",
            "price": 50000.0,
            "amount": 0.02,
            "filled_amount": filled,
            "status": status,
            "label": "quoter"
        })
    }

    #[test]
    fn test_ticker_notification() {
        let (mut p, _) = parser();
        let events = p.handle(&notification(
            "ticker.BTC-PERPETUAL.1000ms",
            json!({"best_bid_price": 49999.5, "best_ask_price": 50000.5, "mark_price": 50000}),
        ));
        match &events[..] {
            [FeedEvent::MarketTick {
                best_bid, best_ask, ..
            }] => {
                assert_eq!(*best_bid, Some(Price::new(dec!(49999.5))));
                assert_eq!(*best_ask, Some(Price::new(dec!(50000.5))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_one_sided_ticker() {
        let (mut p, _) = parser();
        let events = p.handle(&notification(
            "ticker.BTC-PERPETUAL.1000ms",
            json!({"best_bid_price": null, "best_ask_price": 10}),
        ));
        assert!(matches!(
            &events[..],
            [FeedEvent::MarketTick { best_bid: None, best_ask: Some(_), .. }]
        ));
    }

    #[test]
    fn test_portfolio_position() {
        let (mut p, _) = parser();
        let events = p.handle(&notification(
            "account.portfolio",
            json!([
                {"instrument_name": "ETH-PERPETUAL", "position": 3},
                {"instrument_name": "BTC-PERPETUAL", "position": -0.05}
            ]),
        ));
        assert_eq!(
            events,
            vec![FeedEvent::PositionUpdate {
                position: dec!(-0.05)
            }]
        );

        let events = p.handle(&notification("account.portfolio", json!([])));
        assert_eq!(
            events,
            vec![FeedEvent::PositionUpdate {
                position: Decimal::ZERO
            }]
        );
    }

    #[test]
    fn test_partial_then_full_fill() {
        let (mut p, _) = parser();

        let events = p.handle(&notification(
            "session.orders",
            json!([order(7, "partially_filled", 0.005)]),
        ));
        let FeedEvent::OrderUpdate(first) = &events[0] else {
            panic!("expected order update");
        };
        assert_eq!(first.status, OrderStatus::Open);
        assert_eq!(first.remaining, Some(Size::new(dec!(0.015))));
        let fill = first.fill.as_ref().unwrap();
        assert_eq!(fill.size, Size::new(dec!(0.005)));
        assert_eq!(fill.side, Side::Bid);
        // 0.005 * 50000 * 2.5 / 10000
        assert_eq!(fill.fee, dec!(0.0625));

        let events = p.handle(&notification(
            "session.orders",
            json!([order(7, "filled", 0.02)]),
        ));
        let FeedEvent::OrderUpdate(second) = &events[0] else {
            panic!("expected order update");
        };
        assert_eq!(second.status, OrderStatus::Filled);
        assert_eq!(second.fill.as_ref().unwrap().size, Size::new(dec!(0.015)));
    }

    #[test]
    fn test_duplicate_report_yields_no_second_fill() {
        let (mut p, _) = parser();
        p.handle(&notification("session.orders", json!([order(8, "filled", 0.02)])));
        let events = p.handle(&notification("session.orders", json!([order(8, "filled", 0.02)])));
        let FeedEvent::OrderUpdate(update) = &events[0] else {
            panic!("expected order update");
        };
        assert!(update.fill.is_none());
    }

    #[test]
    fn test_other_instrument_ignored() {
        let (mut p, _) = parser();
        let mut raw = order(9, "open", 0.0);
        raw["instrument_name"] = json!("ETH-PERPETUAL");
        assert!(p.handle(&notification("session.orders", json!([raw]))).is_empty());
    }

    #[test]
    fn test_result_routed_by_method() {
        let (mut p, tracker) = parser();
        let (ticker_id, _) = tracker.request(Method::Ticker, json!({}), None).unwrap();
        let (cancel_all_id, _) = tracker.request(Method::CancelAll, json!({}), None).unwrap();

        let events = p.handle(&result(
            ticker_id,
            json!({"best_bid_price": 1, "best_ask_price": 2}),
        ));
        assert!(matches!(&events[..], [FeedEvent::MarketTick { .. }]));

        let events = p.handle(&result(cancel_all_id, json!(3)));
        assert_eq!(events, vec![FeedEvent::CancelAllAck]);

        // Already resolved.
        assert!(p.handle(&result(ticker_id, json!({}))).is_empty());
    }

    #[test]
    fn test_open_orders_filtered_by_label() {
        let (mut p, tracker) = parser();
        let (id, _) = tracker.request(Method::OpenOrders, json!({}), None).unwrap();
        let mut foreign = order(2, "open", 0.0);
        foreign["label"] = json!("someone_else");

        let events = p.handle(&result(id, json!([order(1, "open", 0.01), foreign])));
        let [FeedEvent::OpenOrders(orders)] = &events[..] else {
            panic!("expected open orders");
        };
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, OrderId::from("1"));
        assert_eq!(orders[0].size, Size::new(dec!(0.01)));

        // Fill progress seeded from the open order list.
        let events = p.handle(&notification("session.orders", json!([order(1, "filled", 0.02)])));
        let FeedEvent::OrderUpdate(update) = &events[0] else {
            panic!("expected order update");
        };
        assert_eq!(update.fill.as_ref().unwrap().size, Size::new(dec!(0.01)));
    }

    #[test]
    fn test_error_attributed_to_order() {
        let (mut p, tracker) = parser();
        let (id, _) = tracker
            .request(Method::Amend, json!({}), Some("42".into()))
            .unwrap();
        let msg: WsMessage = serde_json::from_value(
            json!({"id": id, "error": {"code": 1, "message": "order not found"}}),
        )
        .unwrap();

        match &p.handle(&msg)[..] {
            [FeedEvent::ExchangeError {
                method,
                order_id,
                error,
            }] => {
                assert_eq!(*method, Some(Method::Amend));
                assert_eq!(order_id.as_ref().map(OrderId::as_str), Some("42"));
                assert!(error.is_order_not_found());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_account_summary_nested_result() {
        let (mut p, _) = parser();
        let events = p.handle(&notification(
            "account.summary",
            json!({"result": {"unrealised_pnl": 1.5, "session_realised_pnl": -0.25}}),
        ));
        assert_eq!(
            events,
            vec![FeedEvent::AccountSummary(AccountSummary {
                unrealized_pnl: Some(dec!(1.5)),
                realized_pnl: Some(dec!(-0.25)),
            })]
        );
    }

    #[test]
    fn test_trades_with_our_label() {
        let (mut p, _) = parser();
        let events = p.handle(&notification(
            "trades",
            json!({"trades": [
                {"instrument": "BTC-PERPETUAL", "label": "quoter", "direction": "sell", "price": 50001, "amount": 0.01},
                {"instrument": "BTC-PERPETUAL", "label": "other", "direction": "buy", "price": 50000, "amount": 1}
            ]}),
        ));
        assert_eq!(
            events,
            vec![FeedEvent::Trade {
                side: Some(Side::Ask),
                price: Price::new(dec!(50001)),
                size: Size::new(dec!(0.01)),
            }]
        );
    }
}
