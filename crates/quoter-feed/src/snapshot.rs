//! Market snapshot store.
//!
//! Writers merge their fields into a copy of the latest snapshot and swap
//! it in under a short lock. Readers take an `Arc` and never block writers
//! for longer than the pointer clone.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use quoter_core::{Price, Snapshot};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::event::FeedEvent;

#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest published snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    fn update(&self, f: impl FnOnce(&mut Snapshot)) -> u64 {
        let mut guard = self.current.write();
        let mut next = Snapshot::clone(&guard);
        f(&mut next);
        next.version = guard.version + 1;
        let version = next.version;
        *guard = Arc::new(next);
        version
    }

    /// Record a new top of book. A crossed book is rejected and the previous
    /// touch kept.
    pub fn set_touch(&self, best_bid: Option<Price>, best_ask: Option<Price>, at: Instant) -> bool {
        if let (Some(bid), Some(ask)) = (best_bid, best_ask) {
            if bid > ask {
                warn!(bid = %bid, ask = %ask, "Crossed book rejected");
                return false;
            }
        }
        self.update(|s| {
            s.best_bid = best_bid;
            s.best_ask = best_ask;
            s.timestamp = Some(at);
        });
        true
    }

    pub fn set_position(&self, position: Decimal) {
        self.update(|s| s.position = Some(position));
    }

    /// Negative inputs are stored as zero.
    pub fn set_volatility(&self, volatility: Decimal) {
        self.update(|s| s.volatility = volatility.max(Decimal::ZERO));
    }

    pub fn set_bookkeeping(
        &self,
        fees_paid: Decimal,
        realized_pnl: Option<Decimal>,
        unrealized_pnl: Option<Decimal>,
    ) {
        self.update(|s| {
            s.fees_paid = fees_paid;
            s.realized_pnl = realized_pnl;
            s.unrealized_pnl = unrealized_pnl;
        });
    }

    pub fn set_session_up(&self, up: bool) {
        let version = self.update(|s| s.session_up = up);
        debug!(up, version, "Session state published");
    }

    /// Merge the market-data part of an event. Returns whether the
    /// snapshot changed.
    pub fn apply(&self, event: &FeedEvent) -> bool {
        match event {
            FeedEvent::MarketTick {
                best_bid,
                best_ask,
                received_at,
            } => self.set_touch(*best_bid, *best_ask, *received_at),
            FeedEvent::PositionUpdate { position } => {
                self.set_position(*position);
                true
            }
            _ => false,
        }
    }
}
