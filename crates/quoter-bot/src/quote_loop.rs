//! Quoting loop state.
//!
//! Owns the engine and everything around it that is not I/O: feed events
//! and session changes go in, order commands go out through the executor.
//! [`crate::Application`] drives it from the session and the timers; tests
//! drive it directly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quoter_core::{OrderId, OrderStatus, OrderUpdate, Side};
use quoter_executor::{DynActionExecutor, PaperExchange};
use quoter_feed::{FeedEvent, SnapshotStore};
use quoter_mm::{
    FeeLedger, NoQuoteReason, OrderCommand, PnlTracker, QuoteDecision, QuotingEngine,
    VolatilitySource,
};
use quoter_telemetry::{Metrics, OrderView, StateSummary};
use quoter_ws::{Method, RpcError, SessionEvent};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::error::AppResult;

/// Open-orders request retried after this long without an answer.
const RESYNC_RETRY: Duration = Duration::from_secs(5);

/// Cancel-all sent again after this long without an acknowledgment.
const CANCEL_ALL_RETRY: Duration = Duration::from_secs(5);

pub struct QuoteLoop {
    engine: QuotingEngine,
    store: Arc<SnapshotStore>,
    ledger: Box<dyn PnlTracker>,
    volatility: Box<dyn VolatilitySource>,
    executor: DynActionExecutor,
    paper: Option<Arc<PaperExchange>>,
    /// Set while waiting for the open-orders list after a session start.
    resync_requested_at: Option<Instant>,
    cancel_all_sent_at: Option<Instant>,
    sessions: u64,
}

impl QuoteLoop {
    pub fn new(
        engine: QuotingEngine,
        store: Arc<SnapshotStore>,
        executor: DynActionExecutor,
        volatility: Box<dyn VolatilitySource>,
    ) -> Self {
        Self {
            engine,
            store,
            ledger: Box::new(FeeLedger::new()),
            volatility,
            executor,
            paper: None,
            resync_requested_at: None,
            cancel_all_sent_at: None,
            sessions: 0,
        }
    }

    /// Mirror market ticks into a paper venue so it can fill resting orders.
    pub fn with_paper(mut self, paper: Arc<PaperExchange>) -> Self {
        self.paper = Some(paper);
        self
    }

    pub fn engine(&self) -> &QuotingEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn is_awaiting_resync(&self) -> bool {
        self.resync_requested_at.is_some()
    }

    pub async fn on_session(&mut self, event: SessionEvent, now: Instant) -> AppResult<()> {
        match event {
            SessionEvent::Up => {
                self.sessions += 1;
                if self.sessions > 1 {
                    Metrics::reconnect();
                }
                info!(session = self.sessions, "Session up, resynchronizing orders");
                self.store.set_session_up(true);
                Metrics::session_up();
                self.engine.reset_orders();
                self.request_resync(now).await;
            }
            SessionEvent::Down => {
                warn!("Session down, quoting suspended");
                self.store.set_session_up(false);
                Metrics::session_down();
                self.engine.reset_orders();
                self.resync_requested_at = None;
            }
        }
        Ok(())
    }

    async fn request_resync(&mut self, now: Instant) {
        self.resync_requested_at = Some(now);
        if let Err(e) = self.executor.request_open_orders().await {
            warn!(error = %e, "Open orders request failed");
        }
    }

    /// Apply one feed event.
    pub async fn on_feed_event(&mut self, event: FeedEvent) -> AppResult<()> {
        Metrics::feed_event(event.kind());
        match event {
            FeedEvent::MarketTick {
                best_bid, best_ask, ..
            } => {
                if self.store.apply(&event) {
                    if let Some(mid) = self.store.load().mid() {
                        self.volatility.observe_mid(mid);
                    }
                }
                if let Some(paper) = &self.paper {
                    paper.on_market(best_bid, best_ask).await?;
                }
            }
            FeedEvent::PositionUpdate { position } => {
                self.store.apply(&event);
                Metrics::position(to_f64(position));
            }
            FeedEvent::OrderUpdate(update) => self.on_order_update(&update),
            FeedEvent::Trade { side, price, size } => {
                debug!(side = ?side, price = %price, size = %size, "Trade with our label");
            }
            FeedEvent::AccountSummary(summary) => {
                self.ledger.record_account_summary(&summary);
                self.publish_bookkeeping();
            }
            FeedEvent::OpenOrders(orders) => {
                info!(count = orders.len(), "Open orders received");
                self.resync_requested_at = None;
                let commands = self.engine.resync(orders);
                self.submit(commands).await;
            }
            FeedEvent::CancelAllAck => {
                self.engine.on_cancel_all_ack();
                self.cancel_all_sent_at = None;
            }
            FeedEvent::ExchangeError {
                method,
                order_id,
                error,
            } => self.on_exchange_error(method, order_id, &error).await,
        }
        Ok(())
    }

    fn on_order_update(&mut self, update: &OrderUpdate) {
        if let Some(fill) = &update.fill {
            let transition = self.engine.on_fill(fill);
            self.ledger.record_fill(fill);
            Metrics::fill(&fill.side.to_string());
            Metrics::phase(&fill.side.to_string(), transition.to.code());
            self.publish_bookkeeping();
        }
        self.engine.on_order_update(update);
    }

    async fn on_exchange_error(
        &mut self,
        method: Option<Method>,
        order_id: Option<OrderId>,
        error: &RpcError,
    ) {
        Metrics::exchange_error(method.map_or("unknown", |m| m.as_str()));
        let not_found = error.is_order_not_found();

        match method {
            Some(Method::Cancel) if not_found => {
                if let Some(id) = order_id {
                    debug!(order_id = %id, "Cancelled order already gone");
                    self.engine
                        .on_order_update(&OrderUpdate::status(id, OrderStatus::Cancelled));
                }
            }
            Some(Method::Amend) | None if not_found => {
                warn!(
                    order_id = ?order_id.as_ref().map(OrderId::as_str),
                    "Order unknown to the exchange, cancelling everything"
                );
                self.cancel_everything(Instant::now()).await;
            }
            Some(Method::Amend) => {
                let Some(id) = order_id else { return };
                warn!(order_id = %id, message = %error.message, "Amend rejected, cancelling order");
                if let Some(cancel) = self.engine.on_amend_failed(&id, Instant::now()) {
                    self.submit(vec![cancel]).await;
                }
            }
            Some(Method::Cancel) => {
                let Some(id) = order_id else { return };
                if let Some(side) = self.engine.on_cancel_failed(&id) {
                    warn!(side = %side, order_id = %id, message = %error.message, "Cancel refused, retrying");
                }
            }
            Some(Method::Insert) => {
                if let Some(id) = order_id {
                    self.engine
                        .on_order_update(&OrderUpdate::status(id, OrderStatus::Rejected));
                }
            }
            Some(Method::CancelAll) => {
                error!(message = %error.message, "Cancel-all failed, resynchronizing");
                self.engine.on_cancel_all_ack();
                self.request_resync(Instant::now()).await;
            }
            Some(other) => {
                error!(method = %other, message = %error.message, "Request failed");
            }
            None => {
                warn!(message = %error.message, "Unattributed exchange error");
            }
        }
    }

    /// Run one quoting tick. Returns the number of commands sent.
    pub async fn tick(&mut self, now: Instant) -> AppResult<usize> {
        if let Some(requested_at) = self.resync_requested_at {
            if now.saturating_duration_since(requested_at) >= RESYNC_RETRY {
                warn!("No open orders answer, asking again");
                self.request_resync(now).await;
            }
            return Ok(0);
        }
        if !self.executor.is_ready() {
            return Ok(0);
        }
        if !self.engine.is_recovering() {
            self.cancel_all_sent_at = None;
        } else if self
            .cancel_all_sent_at
            .is_some_and(|sent| now.saturating_duration_since(sent) >= CANCEL_ALL_RETRY)
        {
            warn!("Cancel-all unanswered, sending again");
            self.cancel_everything(now).await;
        }

        let started = Instant::now();
        let snapshot = self.store.load();
        let commands = self.engine.tick(&snapshot, now);
        self.record_quotes();

        let sent = commands.len();
        self.submit(commands).await;
        Metrics::tick_duration(started.elapsed().as_secs_f64() * 1000.0);
        Ok(sent)
    }

    fn record_quotes(&self) {
        for side in Side::BOTH {
            let label = side.to_string();
            Metrics::phase(&label, self.engine.phase(side).code());
            let Some(quotes) = self.engine.last_quotes() else {
                continue;
            };
            match quotes.get(side) {
                QuoteDecision::Quote(q) => Metrics::quote(
                    &label,
                    to_f64(q.price.inner()),
                    to_f64(q.size.inner()),
                    to_f64(q.spread_bps),
                ),
                QuoteDecision::NoQuote(reason) => {
                    Metrics::no_quote(&label, &reason.to_string());
                    if *reason == NoQuoteReason::InvariantViolation {
                        Metrics::invariant_violation(&label);
                    }
                }
            }
        }
    }

    /// Desync recovery: pull every order and hold quoting until the
    /// venue confirms.
    async fn cancel_everything(&mut self, now: Instant) {
        self.cancel_all_sent_at = Some(now);
        let commands = self.engine.cancel_all();
        self.submit(commands).await;
    }

    /// Send commands. A command that cannot be sent is undone locally so
    /// the engine's view matches the venue.
    async fn submit(&mut self, commands: Vec<OrderCommand>) {
        let mut queue: VecDeque<OrderCommand> = commands.into();
        while let Some(command) = queue.pop_front() {
            Metrics::action(command.kind());
            let Err(e) = self.executor.submit(command.clone()).await else {
                continue;
            };
            warn!(command = %command, executor = self.executor.name(), error = %e, "Command not sent");
            match command {
                OrderCommand::Insert { order_id, .. } => {
                    self.engine
                        .on_order_update(&OrderUpdate::status(order_id, OrderStatus::Rejected));
                }
                OrderCommand::Amend { order_id, .. } => {
                    queue.extend(self.engine.on_amend_failed(&order_id, Instant::now()));
                }
                OrderCommand::Cancel { order_id, .. } => {
                    self.engine.on_cancel_failed(&order_id);
                }
                OrderCommand::CancelAll => {}
            }
        }
    }

    /// Pick up the current volatility for the next ticks.
    pub fn sample_volatility(&mut self) -> Decimal {
        let volatility = self.volatility.current();
        self.store.set_volatility(volatility);
        Metrics::volatility(to_f64(volatility));
        info!(source = self.volatility.name(), volatility = %volatility, "Volatility updated");
        volatility
    }

    fn publish_bookkeeping(&self) {
        let report = self.ledger.report(self.store.load().mid());
        self.store.set_bookkeeping(
            report.fees_paid,
            Some(report.realized_pnl),
            report.unrealized_pnl,
        );
        Metrics::bookkeeping(
            to_f64(report.fees_paid),
            Some(to_f64(report.realized_pnl)),
            report.unrealized_pnl.map(to_f64),
        );
    }

    pub fn summary(&self) -> StateSummary {
        let snapshot = self.store.load();
        let mid = snapshot.mid();
        let report = self.ledger.report(mid);
        let view = |side: Side| {
            self.engine.working_order(side).map(|o| OrderView {
                id: o.id.to_string(),
                price: o.price.inner(),
                size: o.size.inner(),
                status: o.status.to_string(),
            })
        };

        StateSummary {
            session_up: snapshot.session_up,
            recovering: self.engine.is_recovering(),
            best_bid: snapshot.best_bid.map(|p| p.inner()),
            best_ask: snapshot.best_ask.map(|p| p.inner()),
            mid: mid.map(|p| p.inner()),
            position: snapshot.position,
            volatility: snapshot.volatility,
            bid_phase: self.engine.phase(Side::Bid).to_string(),
            ask_phase: self.engine.phase(Side::Ask).to_string(),
            bid_order: view(Side::Bid),
            ask_order: view(Side::Ask),
            fees_paid: report.fees_paid,
            realized_pnl: report.realized_pnl,
            unrealized_pnl: report.unrealized_pnl,
            bid_fills: report.bid_fills,
            ask_fills: report.ask_fills,
            volume: report.volume,
        }
    }

    /// Pull every order: cancel-all, then the session-wide cancel.
    pub async fn shutdown(&mut self) {
        info!("Cancelling all orders");
        self.cancel_everything(Instant::now()).await;
        if let Err(e) = self.executor.cancel_session().await {
            warn!(error = %e, "Session cancel failed");
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
