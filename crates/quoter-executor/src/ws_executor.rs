//! Exchange executor over the streaming session.
//!
//! Commands become JSON-RPC requests tagged with the client order id, so a
//! failure can be traced back to the order it concerned.

use quoter_core::{OrderId, Price, Size};
use quoter_mm::OrderCommand;
use quoter_ws::{Method, WsWriteHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ExecutorError, ExecutorResult};
use crate::ws_sender::{ActionExecutor, BoxFuture};

pub struct WsActionExecutor {
    handle: WsWriteHandle,
    instrument: String,
    label: String,
}

impl WsActionExecutor {
    pub fn new(handle: WsWriteHandle, instrument: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            handle,
            instrument: instrument.into(),
            label: label.into(),
        }
    }

    /// Method, params and tag for one command.
    pub fn encode(&self, command: &OrderCommand) -> ExecutorResult<(Method, Value, Option<String>)> {
        let encoded = match command {
            OrderCommand::Insert {
                order_id,
                side,
                price,
                size,
            } => (
                Method::Insert,
                json!({
                    "instrument_name": self.instrument,
                    "direction": side.direction(),
                    "price": price_value(*price)?,
                    "amount": size_value(*size)?,
                    "client_order_id": client_id(order_id),
                    "order_type": "limit",
                    "post_only": true,
                    "label": self.label,
                }),
                Some(order_id.to_string()),
            ),
            OrderCommand::Amend {
                order_id,
                price,
                size,
                ..
            } => (
                Method::Amend,
                json!({
                    "client_order_id": client_id(order_id),
                    "price": price_value(*price)?,
                    "amount": size_value(*size)?,
                }),
                Some(order_id.to_string()),
            ),
            OrderCommand::Cancel { order_id, .. } => (
                Method::Cancel,
                json!({ "client_order_id": client_id(order_id) }),
                Some(order_id.to_string()),
            ),
            OrderCommand::CancelAll => (Method::CancelAll, json!({}), None),
        };
        Ok(encoded)
    }
}

impl ActionExecutor for WsActionExecutor {
    fn submit(&self, command: OrderCommand) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            let (method, params, tag) = self.encode(&command)?;
            let id = self.handle.send(method, params, tag).await?;
            debug!(id, command = %command, "Command sent");
            Ok(())
        })
    }

    fn request_open_orders(&self) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            self.handle.send(Method::OpenOrders, json!({}), None).await?;
            Ok(())
        })
    }

    fn cancel_session(&self) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            self.handle.send(Method::CancelSession, json!({}), None).await?;
            Ok(())
        })
    }

    fn is_ready(&self) -> bool {
        self.handle.is_connected()
    }

    fn name(&self) -> &'static str {
        "exchange"
    }
}

/// Numeric client ids go out as numbers.
fn client_id(order_id: &OrderId) -> Value {
    match order_id.as_u64() {
        Some(n) => json!(n),
        None => json!(order_id.as_str()),
    }
}

fn number(value: Decimal) -> ExecutorResult<Value> {
    value
        .to_f64()
        .map(Value::from)
        .ok_or_else(|| ExecutorError::Encode(format!("not representable: {value}")))
}

fn price_value(price: Price) -> ExecutorResult<Value> {
    number(price.inner())
}

fn size_value(size: Size) -> ExecutorResult<Value> {
    number(size.inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use quoter_core::Side;
    use quoter_ws::{ConnectionState, RequestTracker, WsOutbound};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn executor(state: ConnectionState) -> (WsActionExecutor, mpsc::Receiver<WsOutbound>, Arc<RequestTracker>) {
        let (tx, rx) = mpsc::channel(16);
        let tracker = Arc::new(RequestTracker::new());
        let handle = WsWriteHandle::new(tx, Arc::new(RwLock::new(state)), tracker.clone());
        (
            WsActionExecutor::new(handle, "BTC-PERPETUAL", "quoter"),
            rx,
            tracker,
        )
    }

    fn sent(out: WsOutbound) -> Value {
        match out {
            WsOutbound::Request { payload, .. } => serde_json::from_str(&payload).unwrap(),
            WsOutbound::Text(t) => panic!("unexpected text {t}"),
        }
    }

    #[tokio::test]
    async fn test_insert_is_post_only_limit() {
        let (exec, mut rx, tracker) = executor(ConnectionState::Connected);
        exec.submit(OrderCommand::Insert {
            order_id: OrderId::from("1001"),
            side: Side::Ask,
            price: Price::new(dec!(50000.5)),
            size: Size::new(dec!(0.01)),
        })
        .await
        .unwrap();

        let msg = sent(rx.recv().await.unwrap());
        assert_eq!(msg["method"], "private/insert");
        let params = &msg["params"];
        assert_eq!(params["instrument_name"], "BTC-PERPETUAL");
        assert_eq!(params["direction"], "sell");
        assert_eq!(params["price"], 50000.5);
        assert_eq!(params["amount"], 0.01);
        assert_eq!(params["client_order_id"], 1001);
        assert_eq!(params["post_only"], true);
        assert_eq!(params["label"], "quoter");

        let pending = tracker.resolve(msg["id"].as_u64().unwrap()).unwrap();
        assert_eq!(pending.method, Method::Insert);
        assert_eq!(pending.tag.as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn test_amend_and_cancel_reference_client_id() {
        let (exec, mut rx, _) = executor(ConnectionState::Connected);
        exec.submit(OrderCommand::Amend {
            order_id: OrderId::from("7"),
            side: Side::Bid,
            price: Price::new(dec!(99)),
            size: Size::new(dec!(2)),
        })
        .await
        .unwrap();
        exec.submit(OrderCommand::Cancel {
            order_id: OrderId::from("7"),
            side: Side::Bid,
        })
        .await
        .unwrap();
        exec.submit(OrderCommand::CancelAll).await.unwrap();

        let amend = sent(rx.recv().await.unwrap());
        assert_eq!(amend["method"], "private/amend");
        assert_eq!(amend["params"]["client_order_id"], 7);
        assert_eq!(amend["params"]["amount"], 2.0);

        let cancel = sent(rx.recv().await.unwrap());
        assert_eq!(cancel["method"], "private/cancel");

        let cancel_all = sent(rx.recv().await.unwrap());
        assert_eq!(cancel_all["method"], "private/cancel_all");
    }

    #[tokio::test]
    async fn test_disconnected_submit_fails() {
        let (exec, _rx, _) = executor(ConnectionState::Reconnecting);
        assert!(!exec.is_ready());
        assert_eq!(
            exec.submit(OrderCommand::CancelAll).await,
            Err(ExecutorError::NotConnected)
        );
    }
}
