//! In-process paper venue.
//!
//! Accepts commands like the exchange would and answers with the same
//! [`FeedEvent`]s the live session parser produces. Resting orders fill in
//! full when the touch trades through them.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use quoter_core::{
    Fill, Order, OrderId, OrderStatus, OrderUpdate, Price, Side, Size, BPS_DIVISOR,
};
use quoter_feed::FeedEvent;
use quoter_mm::OrderCommand;
use quoter_ws::{Method, RpcError};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::ws_sender::{ActionExecutor, BoxFuture};

#[derive(Debug, Default)]
struct PaperBook {
    orders: HashMap<OrderId, Order>,
    position: Decimal,
    best_bid: Option<Price>,
    best_ask: Option<Price>,
}

impl PaperBook {
    /// A post-only order at `price` would take liquidity.
    fn would_cross(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Bid => self.best_ask.is_some_and(|ask| price >= ask),
            Side::Ask => self.best_bid.is_some_and(|bid| price <= bid),
        }
    }

    fn trades_through(&self, order: &Order) -> bool {
        match order.side {
            Side::Bid => self.best_ask.is_some_and(|ask| ask <= order.price),
            Side::Ask => self.best_bid.is_some_and(|bid| bid >= order.price),
        }
    }
}

pub struct PaperExchange {
    book: Mutex<PaperBook>,
    feedback: mpsc::Sender<FeedEvent>,
    fee_rate_bps: Decimal,
}

impl PaperExchange {
    pub fn new(feedback: mpsc::Sender<FeedEvent>, fee_rate_bps: Decimal) -> Self {
        Self {
            book: Mutex::new(PaperBook::default()),
            feedback,
            fee_rate_bps,
        }
    }

    /// Announce the starting (flat) position.
    pub async fn start(&self) -> ExecutorResult<()> {
        let position = self.book.lock().position;
        self.publish(vec![FeedEvent::PositionUpdate { position }]).await
    }

    pub fn position(&self) -> Decimal {
        self.book.lock().position
    }

    pub fn resting_orders(&self) -> Vec<Order> {
        self.book.lock().orders.values().cloned().collect()
    }

    /// New top of book. Fills every resting order the touch trades through.
    pub async fn on_market(&self, best_bid: Option<Price>, best_ask: Option<Price>) -> ExecutorResult<()> {
        let events = {
            let mut book = self.book.lock();
            book.best_bid = best_bid;
            book.best_ask = best_ask;

            let filled: Vec<OrderId> = book
                .orders
                .values()
                .filter(|o| book.trades_through(o))
                .map(|o| o.id.clone())
                .collect();

            let mut events = Vec::new();
            for id in filled {
                let Some(order) = book.orders.remove(&id) else {
                    continue;
                };
                let fee = (order.size.inner() * order.price.inner() * self.fee_rate_bps
                    / BPS_DIVISOR)
                    .abs();
                let fill = Fill {
                    order_id: order.id.clone(),
                    side: order.side,
                    price: order.price,
                    size: order.size,
                    fee,
                    received_at: Instant::now(),
                };
                book.position += fill.position_delta();
                info!(
                    side = %order.side,
                    order_id = %order.id,
                    price = %order.price,
                    size = %order.size,
                    position = %book.position,
                    "Paper fill"
                );
                events.push(FeedEvent::OrderUpdate(OrderUpdate {
                    order_id: order.id,
                    status: OrderStatus::Filled,
                    side: Some(order.side),
                    price: Some(order.price),
                    remaining: Some(Size::ZERO),
                    fill: Some(fill),
                }));
                events.push(FeedEvent::PositionUpdate {
                    position: book.position,
                });
            }
            events
        };
        self.publish(events).await
    }

    fn execute(&self, command: OrderCommand) -> Vec<FeedEvent> {
        let mut book = self.book.lock();
        match command {
            OrderCommand::Insert {
                order_id,
                side,
                price,
                size,
            } => {
                if book.would_cross(side, price) {
                    warn!(side = %side, order_id = %order_id, price = %price, "Paper insert would cross, rejected");
                    return vec![FeedEvent::OrderUpdate(OrderUpdate {
                        side: Some(side),
                        price: Some(price),
                        ..OrderUpdate::status(order_id, OrderStatus::Rejected)
                    })];
                }
                let mut order = Order::pending(order_id.clone(), side, price, size);
                order.status = OrderStatus::Open;
                book.orders.insert(order_id.clone(), order);
                vec![open_update(order_id, side, price, size)]
            }
            OrderCommand::Amend {
                order_id,
                price,
                size,
                ..
            } => {
                let Some(side) = book.orders.get(&order_id).map(|o| o.side) else {
                    return vec![not_found(Method::Amend, order_id)];
                };
                if book.would_cross(side, price) {
                    return vec![FeedEvent::ExchangeError {
                        method: Some(Method::Amend),
                        order_id: Some(order_id),
                        error: RpcError {
                            code: None,
                            message: "post-only amend would cross".to_string(),
                        },
                    }];
                }
                if let Some(order) = book.orders.get_mut(&order_id) {
                    order.price = price;
                    order.size = size;
                }
                vec![open_update(order_id, side, price, size)]
            }
            OrderCommand::Cancel { order_id, .. } => match book.orders.remove(&order_id) {
                Some(order) => vec![cancelled(order)],
                None => vec![not_found(Method::Cancel, order_id)],
            },
            OrderCommand::CancelAll => {
                let mut events: Vec<FeedEvent> =
                    std::mem::take(&mut book.orders).into_values().map(cancelled).collect();
                events.push(FeedEvent::CancelAllAck);
                events
            }
        }
    }

    async fn publish(&self, events: Vec<FeedEvent>) -> ExecutorResult<()> {
        for event in events {
            debug!(kind = event.kind(), "Paper feedback");
            self.feedback
                .send(event)
                .await
                .map_err(|_| ExecutorError::ChannelClosed)?;
        }
        Ok(())
    }
}

fn open_update(order_id: OrderId, side: Side, price: Price, size: Size) -> FeedEvent {
    FeedEvent::OrderUpdate(OrderUpdate {
        side: Some(side),
        price: Some(price),
        remaining: Some(size),
        ..OrderUpdate::status(order_id, OrderStatus::Open)
    })
}

fn cancelled(order: Order) -> FeedEvent {
    FeedEvent::OrderUpdate(OrderUpdate {
        side: Some(order.side),
        price: Some(order.price),
        remaining: Some(order.size),
        ..OrderUpdate::status(order.id, OrderStatus::Cancelled)
    })
}

fn not_found(method: Method, order_id: OrderId) -> FeedEvent {
    FeedEvent::ExchangeError {
        method: Some(method),
        order_id: Some(order_id),
        error: RpcError {
            code: None,
            message: "order not found".to_string(),
        },
    }
}

impl ActionExecutor for PaperExchange {
    fn submit(&self, command: OrderCommand) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            let events = self.execute(command);
            self.publish(events).await
        })
    }

    fn request_open_orders(&self) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            let orders = self.resting_orders();
            self.publish(vec![FeedEvent::OpenOrders(orders)]).await
        })
    }

    fn cancel_session(&self) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            let events = {
                let mut book = self.book.lock();
                std::mem::take(&mut book.orders)
                    .into_values()
                    .map(cancelled)
                    .collect()
            };
            self.publish(events).await
        })
    }

    fn is_ready(&self) -> bool {
        !self.feedback.is_closed()
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn px(d: Decimal) -> Price {
        Price::new(d)
    }

    async fn venue() -> (PaperExchange, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let paper = PaperExchange::new(tx, dec!(2.5));
        paper
            .on_market(Some(px(dec!(99))), Some(px(dec!(101))))
            .await
            .unwrap();
        (paper, rx)
    }

    fn insert(id: &str, side: Side, price: Decimal) -> OrderCommand {
        OrderCommand::Insert {
            order_id: OrderId::from(id),
            side,
            price: px(price),
            size: Size::new(dec!(1)),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<FeedEvent>) -> Vec<FeedEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_insert_acknowledged_open() {
        let (paper, mut rx) = venue().await;
        paper.submit(insert("1", Side::Bid, dec!(98))).await.unwrap();

        match &drain(&mut rx)[..] {
            [FeedEvent::OrderUpdate(u)] => {
                assert_eq!(u.status, OrderStatus::Open);
                assert_eq!(u.remaining, Some(Size::new(dec!(1))));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(paper.resting_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_crossing_insert_rejected() {
        let (paper, mut rx) = venue().await;
        paper.submit(insert("1", Side::Bid, dec!(101))).await.unwrap();

        match &drain(&mut rx)[..] {
            [FeedEvent::OrderUpdate(u)] => assert_eq!(u.status, OrderStatus::Rejected),
            other => panic!("unexpected {other:?}"),
        }
        assert!(paper.resting_orders().is_empty());
    }

    #[tokio::test]
    async fn test_touch_through_fills_and_moves_position() {
        let (paper, mut rx) = venue().await;
        paper.submit(insert("1", Side::Ask, dec!(100))).await.unwrap();
        drain(&mut rx);

        paper
            .on_market(Some(px(dec!(100))), Some(px(dec!(100.5))))
            .await
            .unwrap();

        let events = drain(&mut rx);
        let FeedEvent::OrderUpdate(update) = &events[0] else {
            panic!("expected fill");
        };
        let fill = update.fill.as_ref().unwrap();
        assert_eq!(update.status, OrderStatus::Filled);
        assert_eq!(fill.side, Side::Ask);
        // 1 * 100 * 2.5 / 10000
        assert_eq!(fill.fee, dec!(0.025));
        assert_eq!(
            events[1],
            FeedEvent::PositionUpdate {
                position: dec!(-1)
            }
        );
        assert_eq!(paper.position(), dec!(-1));
    }

    #[tokio::test]
    async fn test_unknown_order_reports_not_found() {
        let (paper, mut rx) = venue().await;
        paper
            .submit(OrderCommand::Cancel {
                order_id: OrderId::from("404"),
                side: Side::Bid,
            })
            .await
            .unwrap();

        match &drain(&mut rx)[..] {
            [FeedEvent::ExchangeError { method, error, .. }] => {
                assert_eq!(*method, Some(Method::Cancel));
                assert!(error.is_order_not_found());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_amend_moves_resting_order() {
        let (paper, mut rx) = venue().await;
        paper.submit(insert("1", Side::Bid, dec!(98))).await.unwrap();
        paper
            .submit(OrderCommand::Amend {
                order_id: OrderId::from("1"),
                side: Side::Bid,
                price: px(dec!(98.5)),
                size: Size::new(dec!(2)),
            })
            .await
            .unwrap();
        drain(&mut rx);

        let resting = paper.resting_orders();
        assert_eq!(resting[0].price, px(dec!(98.5)));
        assert_eq!(resting[0].size, Size::new(dec!(2)));
    }

    #[tokio::test]
    async fn test_cancel_all_acknowledged() {
        let (paper, mut rx) = venue().await;
        paper.submit(insert("1", Side::Bid, dec!(98))).await.unwrap();
        paper.submit(insert("2", Side::Ask, dec!(102))).await.unwrap();
        drain(&mut rx);

        paper.submit(OrderCommand::CancelAll).await.unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], FeedEvent::CancelAllAck);
        assert!(paper.resting_orders().is_empty());
    }

    #[tokio::test]
    async fn test_open_orders_lists_resting() {
        let (paper, mut rx) = venue().await;
        paper.submit(insert("1", Side::Bid, dec!(98))).await.unwrap();
        drain(&mut rx);

        paper.request_open_orders().await.unwrap();
        match &drain(&mut rx)[..] {
            [FeedEvent::OpenOrders(orders)] => assert_eq!(orders[0].id, OrderId::from("1")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
