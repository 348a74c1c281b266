//! Order reconciliation.
//!
//! Diffs the target quote for a side against that side's working order and
//! picks the single action that brings the venue in line:
//!
//! | target | working order            | action |
//! |--------|--------------------------|--------|
//! | none   | none / terminal          | NONE   |
//! | none   | live                     | CANCEL |
//! | some   | none / terminal          | INSERT |
//! | some   | live, within thresholds  | NONE   |
//! | some   | live, beyond a threshold | AMEND  |
//!
//! An order with an unacknowledged cancel is left alone until the venue
//! answers, so a side never has two mutating requests in flight from one
//! tick.

use std::fmt;

use quoter_core::{Order, OrderId, Price, Side, Size};

use crate::config::QuoterParams;
use crate::quote_engine::TargetQuote;

/// Reconciler output for one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteAction {
    None,
    Insert {
        side: Side,
        price: Price,
        size: Size,
    },
    Amend {
        order_id: OrderId,
        side: Side,
        price: Price,
        size: Size,
    },
    Cancel {
        order_id: OrderId,
        side: Side,
    },
}

impl QuoteAction {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Insert { .. } => "insert",
            Self::Amend { .. } => "amend",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Request sent to the action executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCommand {
    Insert {
        order_id: OrderId,
        side: Side,
        price: Price,
        size: Size,
    },
    Amend {
        order_id: OrderId,
        side: Side,
        price: Price,
        size: Size,
    },
    Cancel {
        order_id: OrderId,
        side: Side,
    },
    /// Cancel every order of this session.
    CancelAll,
}

impl OrderCommand {
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            Self::Insert { order_id, .. }
            | Self::Amend { order_id, .. }
            | Self::Cancel { order_id, .. } => Some(order_id),
            Self::CancelAll => None,
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Self::Insert { side, .. } | Self::Amend { side, .. } | Self::Cancel { side, .. } => {
                Some(*side)
            }
            Self::CancelAll => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Amend { .. } => "amend",
            Self::Cancel { .. } => "cancel",
            Self::CancelAll => "cancel_all",
        }
    }
}

impl fmt::Display for OrderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert {
                order_id,
                side,
                price,
                size,
            } => write!(f, "INSERT {side} {size}@{price} ({order_id})"),
            Self::Amend {
                order_id,
                side,
                price,
                size,
            } => write!(f, "AMEND {side} {size}@{price} ({order_id})"),
            Self::Cancel { order_id, side } => write!(f, "CANCEL {side} ({order_id})"),
            Self::CancelAll => write!(f, "CANCEL_ALL"),
        }
    }
}

/// Decide the action for one side.
pub fn reconcile(
    target: Option<&TargetQuote>,
    order: Option<&Order>,
    params: &QuoterParams,
) -> QuoteAction {
    // Rejected, filled or cancelled orders no longer occupy the side.
    let live = order.filter(|o| o.is_working());

    match (target, live) {
        (_, Some(order)) if order.cancel_in_flight => QuoteAction::None,
        (None, None) => QuoteAction::None,
        (None, Some(order)) => QuoteAction::Cancel {
            order_id: order.id.clone(),
            side: order.side,
        },
        (Some(target), None) => QuoteAction::Insert {
            side: target.side,
            price: target.price,
            size: target.size,
        },
        (Some(target), Some(order)) => {
            let price_moved = target.price.abs_diff(order.price) > params.amend_threshold;
            let size_moved = target.size.abs_diff(order.size) > params.size_amend_threshold;
            if price_moved || size_moved {
                QuoteAction::Amend {
                    order_id: order.id.clone(),
                    side: order.side,
                    price: target.price,
                    size: target.size,
                }
            } else {
                QuoteAction::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoter_core::OrderStatus;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn params() -> QuoterParams {
        QuoterParams {
            amend_threshold: dec!(0.01),
            size_amend_threshold: dec!(0),
            ..Default::default()
        }
    }

    fn target(price: Decimal, size: Decimal) -> TargetQuote {
        TargetQuote {
            side: Side::Bid,
            price: Price::new(price),
            size: Size::new(size),
            spread_bps: dec!(1),
        }
    }

    fn open_order(price: Decimal, size: Decimal) -> Order {
        Order {
            status: OrderStatus::Open,
            ..Order::pending(
                OrderId::from("1001"),
                Side::Bid,
                Price::new(price),
                Size::new(size),
            )
        }
    }

    #[test]
    fn test_nothing_to_do() {
        assert_eq!(reconcile(None, None, &params()), QuoteAction::None);
    }

    #[test]
    fn test_no_target_cancels_working_order() {
        let order = open_order(dec!(100), dec!(1));
        assert_eq!(
            reconcile(None, Some(&order), &params()),
            QuoteAction::Cancel {
                order_id: OrderId::from("1001"),
                side: Side::Bid,
            }
        );
    }

    #[test]
    fn test_target_without_order_inserts() {
        let t = target(dec!(99.5), dec!(0.5));
        assert_eq!(
            reconcile(Some(&t), None, &params()),
            QuoteAction::Insert {
                side: Side::Bid,
                price: Price::new(dec!(99.5)),
                size: Size::new(dec!(0.5)),
            }
        );
    }

    #[test]
    fn test_small_price_change_is_ignored() {
        let order = open_order(dec!(100.00), dec!(1));
        let t = target(dec!(100.0005), dec!(1));
        assert_eq!(reconcile(Some(&t), Some(&order), &params()), QuoteAction::None);
    }

    #[test]
    fn test_price_change_beyond_threshold_amends() {
        let order = open_order(dec!(100.00), dec!(1));
        let t = target(dec!(100.02), dec!(1));
        assert_eq!(
            reconcile(Some(&t), Some(&order), &params()),
            QuoteAction::Amend {
                order_id: OrderId::from("1001"),
                side: Side::Bid,
                price: Price::new(dec!(100.02)),
                size: Size::new(dec!(1)),
            }
        );
    }

    #[test]
    fn test_price_change_equal_to_threshold_is_ignored() {
        let order = open_order(dec!(100.00), dec!(1));
        let t = target(dec!(100.01), dec!(1));
        assert!(reconcile(Some(&t), Some(&order), &params()).is_none());
    }

    #[test]
    fn test_size_change_alone_amends() {
        let order = open_order(dec!(100), dec!(1));
        let t = target(dec!(100), dec!(0.7));
        let action = reconcile(Some(&t), Some(&order), &params());
        assert_eq!(action.kind(), "amend");
    }

    #[test]
    fn test_size_change_within_size_threshold_is_ignored() {
        let params = QuoterParams {
            size_amend_threshold: dec!(0.5),
            ..params()
        };
        let order = open_order(dec!(100), dec!(1));
        let t = target(dec!(100), dec!(0.7));
        assert!(reconcile(Some(&t), Some(&order), &params).is_none());
    }

    #[test]
    fn test_rejected_order_counts_as_absent() {
        let mut order = open_order(dec!(100), dec!(1));
        order.status = OrderStatus::Rejected;
        let t = target(dec!(100), dec!(1));
        assert_eq!(reconcile(Some(&t), Some(&order), &params()).kind(), "insert");
        assert!(reconcile(None, Some(&order), &params()).is_none());
    }

    #[test]
    fn test_pending_order_can_be_amended_and_cancelled() {
        let order = Order::pending(
            OrderId::from("7"),
            Side::Bid,
            Price::new(dec!(100)),
            Size::new(dec!(1)),
        );
        let t = target(dec!(99), dec!(1));
        assert_eq!(reconcile(Some(&t), Some(&order), &params()).kind(), "amend");
        assert_eq!(reconcile(None, Some(&order), &params()).kind(), "cancel");
    }

    #[test]
    fn test_cancel_in_flight_waits_for_ack() {
        let mut order = open_order(dec!(100), dec!(1));
        order.cancel_in_flight = true;
        assert!(reconcile(None, Some(&order), &params()).is_none());
        let t = target(dec!(95), dec!(1));
        assert!(reconcile(Some(&t), Some(&order), &params()).is_none());
    }

    #[test]
    fn test_order_command_accessors() {
        let cmd = OrderCommand::Cancel {
            order_id: OrderId::from("9"),
            side: Side::Ask,
        };
        assert_eq!(cmd.order_id(), Some(&OrderId::from("9")));
        assert_eq!(cmd.side(), Some(Side::Ask));
        assert_eq!(cmd.to_string(), "CANCEL ask (9)");
        assert_eq!(OrderCommand::CancelAll.order_id(), None);
    }
}
