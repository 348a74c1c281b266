//! Quoting engine.
//!
//! Owns the per-side state (cooldown machine + working order) and runs one
//! quoting tick at a time:
//!
//! ```text
//! Snapshot ─► advance machines ─► compute_quotes ─► reconcile per side
//!                                                        │
//!                       optimistic local update ◄────────┤
//!                                                        ▼
//!                                               Vec<OrderCommand>
//! ```
//!
//! Executor feedback (`on_order_update`, `on_fill`) is applied between ticks
//! by the single task that owns the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use quoter_core::{
    Fill, Order, OrderId, OrderIdGenerator, OrderStatus, OrderUpdate, Side, Snapshot, TickRounder,
};

use crate::config::QuoterParams;
use crate::cooldown::{CooldownMachine, Phase, PhaseTransition};
use crate::quote_engine::{compute_quotes, QuotePair};
use crate::reconciler::{reconcile, OrderCommand, QuoteAction};

/// An unanswered cancel is sent again after this long.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// State of one side.
#[derive(Debug, Clone)]
pub struct SideState {
    machine: CooldownMachine,
    working_order: Option<Order>,
    cancel_sent_at: Option<Instant>,
    /// The venue's view of the working order is unknown: pull it before
    /// quoting this side again.
    must_cancel: bool,
}

impl SideState {
    fn new(params: &QuoterParams) -> Self {
        Self {
            machine: CooldownMachine::new(params.cooldown_duration(), params.recovery_duration()),
            working_order: None,
            cancel_sent_at: None,
            must_cancel: false,
        }
    }

    fn clear_order(&mut self) {
        self.working_order = None;
        self.cancel_sent_at = None;
        self.must_cancel = false;
    }

    /// Drop cancel bookkeeping for a closed order and release a cancel
    /// that went unanswered for [`CANCEL_TIMEOUT`].
    fn check_cancel(&mut self, side: Side, now: Instant) {
        let Some(order) = self.working_order.as_mut() else {
            self.cancel_sent_at = None;
            self.must_cancel = false;
            return;
        };
        if !order.cancel_in_flight {
            return;
        }
        match self.cancel_sent_at {
            None => self.cancel_sent_at = Some(now),
            Some(sent) if now.saturating_duration_since(sent) >= CANCEL_TIMEOUT => {
                warn!(side = %side, order_id = %order.id, "Cancel unanswered, sending again");
                order.cancel_in_flight = false;
                self.cancel_sent_at = None;
                self.must_cancel = true;
            }
            Some(_) => {}
        }
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn phase_entered_at(&self) -> Option<Instant> {
        self.machine.phase_entered_at()
    }

    pub fn working_order(&self) -> Option<&Order> {
        self.working_order.as_ref()
    }

    pub fn must_cancel(&self) -> bool {
        self.must_cancel
    }
}

/// Single-instrument quoting engine.
pub struct QuotingEngine {
    params: QuoterParams,
    rounder: Arc<dyn TickRounder>,
    ids: OrderIdGenerator,
    sides: [SideState; 2],
    /// Set by `cancel_all` until the venue confirms it.
    recovering: bool,
    last_quotes: Option<QuotePair>,
}

impl QuotingEngine {
    pub fn new(params: QuoterParams, rounder: Arc<dyn TickRounder>) -> Self {
        Self::with_id_generator(params, rounder, OrderIdGenerator::new())
    }

    pub fn with_id_generator(
        params: QuoterParams,
        rounder: Arc<dyn TickRounder>,
        ids: OrderIdGenerator,
    ) -> Self {
        let sides = [SideState::new(&params), SideState::new(&params)];
        Self {
            params,
            rounder,
            ids,
            sides,
            recovering: false,
            last_quotes: None,
        }
    }

    pub fn params(&self) -> &QuoterParams {
        &self.params
    }

    pub fn side(&self, side: Side) -> &SideState {
        &self.sides[side.index()]
    }

    pub fn phase(&self, side: Side) -> Phase {
        self.side(side).phase()
    }

    pub fn working_order(&self, side: Side) -> Option<&Order> {
        self.side(side).working_order()
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// Quotes computed by the most recent tick.
    pub fn last_quotes(&self) -> Option<&QuotePair> {
        self.last_quotes.as_ref()
    }

    /// A fill of one of our orders. Puts the side into COOLDOWN.
    pub fn on_fill(&mut self, fill: &Fill) -> PhaseTransition {
        let state = &mut self.sides[fill.side.index()];
        let transition = state.machine.on_fill(fill.received_at);
        info!(
            side = %fill.side,
            order_id = %fill.order_id,
            price = %fill.price,
            size = %fill.size,
            from = %transition.from,
            "Fill, side entering cooldown"
        );

        if let Some(order) = state.working_order.as_mut().filter(|o| o.id == fill.order_id) {
            order.size = order.size.saturating_sub(fill.size);
            if order.size.is_zero() {
                state.working_order = None;
            }
        }
        transition
    }

    fn side_of(&self, order_id: &OrderId) -> Option<Side> {
        Side::BOTH.into_iter().find(|s| {
            self.sides[s.index()]
                .working_order
                .as_ref()
                .is_some_and(|o| &o.id == order_id)
        })
    }

    /// Apply executor feedback. Returns the side the update matched, if any.
    pub fn on_order_update(&mut self, update: &OrderUpdate) -> Option<Side> {
        let side = self.side_of(&update.order_id)?;
        let slot = &mut self.sides[side.index()].working_order;

        match update.status {
            OrderStatus::Pending => {}
            OrderStatus::Open => {
                if let Some(order) = slot.as_mut() {
                    order.status = OrderStatus::Open;
                    if let Some(price) = update.price {
                        order.price = price;
                    }
                    if let Some(remaining) = update.remaining {
                        order.size = remaining;
                    }
                }
            }
            OrderStatus::Rejected => {
                warn!(side = %side, order_id = %update.order_id, "Order rejected");
                *slot = None;
            }
            OrderStatus::Filled | OrderStatus::Cancelled => {
                debug!(side = %side, order_id = %update.order_id, status = %update.status, "Order closed");
                *slot = None;
            }
        }
        Some(side)
    }

    /// A cancel that was refused or never sent. The order is still live
    /// and is cancelled again on the next tick.
    pub fn on_cancel_failed(&mut self, order_id: &OrderId) -> Option<Side> {
        let side = self.side_of(order_id)?;
        let state = &mut self.sides[side.index()];
        if let Some(order) = state.working_order.as_mut() {
            order.cancel_in_flight = false;
        }
        state.cancel_sent_at = None;
        state.must_cancel = true;
        Some(side)
    }

    /// An amend that did not take effect: the venue still holds the old
    /// price and size. Returns the cancel that pulls the order.
    pub fn on_amend_failed(&mut self, order_id: &OrderId, now: Instant) -> Option<OrderCommand> {
        let side = self.side_of(order_id)?;
        let state = &mut self.sides[side.index()];
        state.must_cancel = true;
        if state.working_order.as_ref().is_some_and(|o| o.cancel_in_flight) {
            return None;
        }
        self.apply(
            QuoteAction::Cancel {
                order_id: order_id.clone(),
                side,
            },
            now,
        )
    }

    /// Run one quoting tick against `snapshot`.
    ///
    /// Returns at most one command per side, already reflected in local
    /// order state.
    pub fn tick(&mut self, snapshot: &Snapshot, now: Instant) -> Vec<OrderCommand> {
        for side in Side::BOTH {
            let state = &mut self.sides[side.index()];
            for tr in state.machine.advance(now) {
                info!(side = %side, from = %tr.from, to = %tr.to, "Phase transition");
            }
            if state.working_order.as_ref().is_some_and(|o| !o.is_working()) {
                state.working_order = None;
            }
            state.check_cancel(side, now);
        }

        if self.recovering {
            return Vec::new();
        }

        let phases = [self.phase(Side::Bid), self.phase(Side::Ask)];
        let quotes = compute_quotes(snapshot, phases, &self.params, self.rounder.as_ref(), now);

        let mut commands = Vec::with_capacity(2);
        for side in Side::BOTH {
            let state = &self.sides[side.index()];
            let action = match state.working_order.as_ref() {
                Some(order) if state.must_cancel && !order.cancel_in_flight => QuoteAction::Cancel {
                    order_id: order.id.clone(),
                    side,
                },
                working => reconcile(quotes.get(side).target(), working, &self.params),
            };
            if let Some(cmd) = self.apply(action, now) {
                debug!(side = %side, command = %cmd, "Reconciled");
                commands.push(cmd);
            }
        }

        self.last_quotes = Some(quotes);
        commands
    }

    /// Turn an action into a command and record it locally.
    fn apply(&mut self, action: QuoteAction, now: Instant) -> Option<OrderCommand> {
        match action {
            QuoteAction::None => None,
            QuoteAction::Insert { side, price, size } => {
                let order_id = self.ids.next_id();
                self.sides[side.index()].working_order =
                    Some(Order::pending(order_id.clone(), side, price, size));
                Some(OrderCommand::Insert {
                    order_id,
                    side,
                    price,
                    size,
                })
            }
            QuoteAction::Amend {
                order_id,
                side,
                price,
                size,
            } => {
                if let Some(order) = self.sides[side.index()].working_order.as_mut() {
                    order.price = price;
                    order.size = size;
                }
                Some(OrderCommand::Amend {
                    order_id,
                    side,
                    price,
                    size,
                })
            }
            QuoteAction::Cancel { order_id, side } => {
                let state = &mut self.sides[side.index()];
                if let Some(order) = state.working_order.as_mut() {
                    order.cancel_in_flight = true;
                    state.cancel_sent_at = Some(now);
                }
                Some(OrderCommand::Cancel { order_id, side })
            }
        }
    }

    /// Replace local orders with the venue's open orders for this session.
    ///
    /// The first open order per side is adopted; the rest are cancelled.
    /// The list is authoritative, so a pending cancel-all is settled too.
    pub fn resync(&mut self, open_orders: Vec<Order>) -> Vec<OrderCommand> {
        self.reset_orders();
        if self.recovering {
            info!("Open orders received, cancel-all settled");
            self.recovering = false;
        }
        let mut commands = Vec::new();
        for mut order in open_orders.into_iter().filter(Order::is_working) {
            let slot = &mut self.sides[order.side.index()].working_order;
            if slot.is_none() {
                order.cancel_in_flight = false;
                info!(side = %order.side, order_id = %order.id, price = %order.price, "Adopted open order");
                *slot = Some(order);
            } else {
                warn!(side = %order.side, order_id = %order.id, "Extra open order, cancelling");
                commands.push(OrderCommand::Cancel {
                    order_id: order.id,
                    side: order.side,
                });
            }
        }
        commands
    }

    /// Forget all working orders.
    pub fn reset_orders(&mut self) {
        for state in &mut self.sides {
            state.clear_order();
        }
    }

    /// Cancel everything and stop quoting until [`Self::on_cancel_all_ack`].
    pub fn cancel_all(&mut self) -> Vec<OrderCommand> {
        self.reset_orders();
        self.recovering = true;
        vec![OrderCommand::CancelAll]
    }

    pub fn on_cancel_all_ack(&mut self) {
        if self.recovering {
            info!("Cancel-all acknowledged, quoting resumes");
        }
        self.recovering = false;
    }
}
