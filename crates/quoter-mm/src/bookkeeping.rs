//! Fee and PnL bookkeeping.
//!
//! The quoting core only forwards fills and account summaries here; it
//! never reads PnL back for pricing decisions.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use quoter_core::{AccountSummary, Fill, Price, Side};

/// Consumes fills and account summaries, reports fees and PnL.
pub trait PnlTracker: Send {
    fn record_fill(&mut self, fill: &Fill);

    fn record_account_summary(&mut self, summary: &AccountSummary);

    /// Current figures, marking open inventory at `mark` when given.
    fn report(&self, mark: Option<Price>) -> PnlReport;
}

/// Point-in-time bookkeeping figures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PnlReport {
    pub fees_paid: Decimal,
    /// Exchange-reported value when available, local estimate otherwise.
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Option<Decimal>,
    /// Net position built from fills seen by this process.
    pub net_size: Decimal,
    pub avg_entry: Decimal,
    pub bid_fills: u64,
    pub ask_fills: u64,
    /// Traded notional.
    pub volume: Decimal,
}

/// Local average-cost ledger.
#[derive(Debug, Default)]
pub struct FeeLedger {
    net_size: Decimal,
    avg_entry: Decimal,
    realized_pnl: Decimal,
    fees_paid: Decimal,
    bid_fills: u64,
    ask_fills: u64,
    volume: Decimal,
    exchange: AccountSummary,
}

impl FeeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fees_paid(&self) -> Decimal {
        self.fees_paid
    }

    fn apply_inventory(&mut self, side: Side, price: Decimal, size: Decimal) {
        let signed_size = side.sign() * size;
        let old_size = self.net_size;
        let new_size = old_size + signed_size;

        // Reducing: realize PnL on the closed part.
        if old_size.signum() * signed_size.signum() < Decimal::ZERO {
            let reduce_amount = size.min(old_size.abs());
            self.realized_pnl += (price - self.avg_entry) * reduce_amount * old_size.signum();
        }

        if new_size.is_zero() {
            self.avg_entry = Decimal::ZERO;
        } else if !old_size.is_zero() && new_size.signum() != old_size.signum() {
            // Flipped through zero: the remainder opened at the fill price.
            self.avg_entry = price;
        } else if old_size.is_zero() || new_size.signum() == signed_size.signum() {
            let old_notional = old_size.abs() * self.avg_entry;
            self.avg_entry = (old_notional + size * price) / new_size.abs();
        }

        self.net_size = new_size;
    }
}

impl PnlTracker for FeeLedger {
    fn record_fill(&mut self, fill: &Fill) {
        let price = fill.price.inner();
        let size = fill.size.inner();
        self.apply_inventory(fill.side, price, size);
        self.fees_paid += fill.fee;
        self.volume += size * price;
        match fill.side {
            Side::Bid => self.bid_fills += 1,
            Side::Ask => self.ask_fills += 1,
        }
    }

    fn record_account_summary(&mut self, summary: &AccountSummary) {
        if summary.realized_pnl.is_some() {
            self.exchange.realized_pnl = summary.realized_pnl;
        }
        if summary.unrealized_pnl.is_some() {
            self.exchange.unrealized_pnl = summary.unrealized_pnl;
        }
    }

    fn report(&self, mark: Option<Price>) -> PnlReport {
        let local_unrealized = mark.map(|m| (m.inner() - self.avg_entry) * self.net_size);
        PnlReport {
            fees_paid: self.fees_paid,
            realized_pnl: self.exchange.realized_pnl.unwrap_or(self.realized_pnl),
            unrealized_pnl: self.exchange.unrealized_pnl.or(local_unrealized),
            net_size: self.net_size,
            avg_entry: self.avg_entry,
            bid_fills: self.bid_fills,
            ask_fills: self.ask_fills,
            volume: self.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoter_core::{OrderId, Size};
    use rust_decimal_macros::dec;
    use std::time::Instant;

    fn fill(side: Side, price: Decimal, size: Decimal, fee: Decimal) -> Fill {
        Fill {
            order_id: OrderId::from("1"),
            side,
            price: Price::new(price),
            size: Size::new(size),
            fee,
            received_at: Instant::now(),
        }
    }

    #[test]
    fn test_fees_and_counts_accumulate() {
        let mut ledger = FeeLedger::new();
        ledger.record_fill(&fill(Side::Bid, dec!(100), dec!(1), dec!(0.025)));
        ledger.record_fill(&fill(Side::Ask, dec!(101), dec!(1), dec!(0.02525)));

        let report = ledger.report(None);
        assert_eq!(report.fees_paid, dec!(0.05025));
        assert_eq!(report.bid_fills, 1);
        assert_eq!(report.ask_fills, 1);
        assert_eq!(report.volume, dec!(201));
        assert_eq!(ledger.fees_paid(), dec!(0.05025));
    }

    #[test]
    fn test_round_trip_realizes_pnl() {
        let mut ledger = FeeLedger::new();
        ledger.record_fill(&fill(Side::Bid, dec!(100), dec!(2), dec!(0)));
        ledger.record_fill(&fill(Side::Ask, dec!(103), dec!(1), dec!(0)));

        let report = ledger.report(Some(Price::new(dec!(104))));
        assert_eq!(report.realized_pnl, dec!(3));
        assert_eq!(report.net_size, dec!(1));
        assert_eq!(report.avg_entry, dec!(100));
        assert_eq!(report.unrealized_pnl, Some(dec!(4)));
    }

    #[test]
    fn test_short_round_trip() {
        let mut ledger = FeeLedger::new();
        ledger.record_fill(&fill(Side::Ask, dec!(100), dec!(1), dec!(0)));
        ledger.record_fill(&fill(Side::Bid, dec!(98), dec!(1), dec!(0)));

        let report = ledger.report(None);
        assert_eq!(report.realized_pnl, dec!(2));
        assert_eq!(report.net_size, dec!(0));
        assert_eq!(report.avg_entry, dec!(0));
    }

    #[test]
    fn test_position_flip_resets_entry() {
        let mut ledger = FeeLedger::new();
        ledger.record_fill(&fill(Side::Bid, dec!(100), dec!(1), dec!(0)));
        ledger.record_fill(&fill(Side::Ask, dec!(102), dec!(3), dec!(0)));

        let report = ledger.report(Some(Price::new(dec!(101))));
        assert_eq!(report.realized_pnl, dec!(2));
        assert_eq!(report.net_size, dec!(-2));
        assert_eq!(report.avg_entry, dec!(102));
        assert_eq!(report.unrealized_pnl, Some(dec!(2)));
    }

    #[test]
    fn test_adding_to_position_averages_entry() {
        let mut ledger = FeeLedger::new();
        ledger.record_fill(&fill(Side::Bid, dec!(100), dec!(1), dec!(0)));
        ledger.record_fill(&fill(Side::Bid, dec!(110), dec!(1), dec!(0)));
        assert_eq!(ledger.report(None).avg_entry, dec!(105));
    }

    #[test]
    fn test_exchange_summary_overrides_local_pnl() {
        let mut ledger = FeeLedger::new();
        ledger.record_fill(&fill(Side::Bid, dec!(100), dec!(1), dec!(0)));
        ledger.record_account_summary(&AccountSummary {
            unrealized_pnl: Some(dec!(-1.5)),
            realized_pnl: Some(dec!(12)),
        });

        let report = ledger.report(Some(Price::new(dec!(200))));
        assert_eq!(report.realized_pnl, dec!(12));
        assert_eq!(report.unrealized_pnl, Some(dec!(-1.5)));

        // A partial summary keeps the previous figure for the missing field.
        ledger.record_account_summary(&AccountSummary {
            unrealized_pnl: Some(dec!(0.5)),
            realized_pnl: None,
        });
        let report = ledger.report(None);
        assert_eq!(report.realized_pnl, dec!(12));
        assert_eq!(report.unrealized_pnl, Some(dec!(0.5)));
    }
}
