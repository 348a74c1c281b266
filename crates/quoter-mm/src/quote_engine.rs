//! Quote price and size calculation.
//!
//! Turns one snapshot plus the per-side phases into a target quote per side:
//! - Volatility-driven base spread between `min_spread_bps` and `max_spread_bps`
//! - Quadratic position widening on the side that adds exposure
//! - Recovery widening / cooldown hold from the fill state machine
//! - Tick rounding, then clamping so a quote never crosses the touch
//! - Volatility-scaled size capped by the room left to `max_position`
//!
//! Bid and ask go through the same code path, parameterized by `Side`.

use std::fmt;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::error;

use quoter_core::{Price, Side, Size, Snapshot, TickRounder};

use crate::config::QuoterParams;
use crate::cooldown::Phase;

/// A concrete quote for one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetQuote {
    pub side: Side,
    pub price: Price,
    pub size: Size,
    /// Model spread from mid in bps, before rounding and clamping.
    pub spread_bps: Decimal,
}

/// Why a side is not quoted this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoQuoteReason {
    /// Top of book missing, one-sided or crossed.
    NoMarket,
    /// Snapshot too old or session down.
    Stale,
    /// No portfolio update received yet.
    PositionUnknown,
    /// Side is holding after a fill.
    Cooldown,
    /// Position limit reached on this side.
    PositionLimit,
    /// Size rounded to zero.
    ZeroSize,
    /// The computed quote failed a sanity check.
    InvariantViolation,
}

impl fmt::Display for NoQuoteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoMarket => "no_market",
            Self::Stale => "stale",
            Self::PositionUnknown => "position_unknown",
            Self::Cooldown => "cooldown",
            Self::PositionLimit => "position_limit",
            Self::ZeroSize => "zero_size",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{s}")
    }
}

/// Decision for one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteDecision {
    Quote(TargetQuote),
    NoQuote(NoQuoteReason),
}

impl QuoteDecision {
    pub fn target(&self) -> Option<&TargetQuote> {
        match self {
            Self::Quote(q) => Some(q),
            Self::NoQuote(_) => None,
        }
    }
}

/// Decisions for both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePair {
    pub bid: QuoteDecision,
    pub ask: QuoteDecision,
}

impl QuotePair {
    fn both(reason: NoQuoteReason) -> Self {
        Self {
            bid: QuoteDecision::NoQuote(reason),
            ask: QuoteDecision::NoQuote(reason),
        }
    }

    pub fn get(&self, side: Side) -> &QuoteDecision {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }
}

/// Market inputs for one side computation, taken from a single snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MarketInputs {
    pub best_bid: Price,
    pub best_ask: Price,
    pub mid: Price,
    pub position: Decimal,
    pub volatility: Decimal,
}

impl MarketInputs {
    /// Extract inputs from a snapshot, or the reason none can be quoted.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        params: &QuoterParams,
        now: Instant,
    ) -> Result<Self, NoQuoteReason> {
        if snapshot.is_stale(now, params.stale_after()) {
            return Err(NoQuoteReason::Stale);
        }
        let (Some(best_bid), Some(best_ask), Some(mid)) =
            (snapshot.best_bid, snapshot.best_ask, snapshot.mid())
        else {
            return Err(NoQuoteReason::NoMarket);
        };
        let position = snapshot.position.ok_or(NoQuoteReason::PositionUnknown)?;
        Ok(Self {
            best_bid,
            best_ask,
            mid,
            position,
            volatility: snapshot.volatility,
        })
    }
}

fn clamp(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

/// Volatility-driven spread in bps, bounded to `[min_spread_bps, max_spread_bps]`.
pub fn base_spread_bps(volatility: Decimal, params: &QuoterParams) -> Decimal {
    let vol = clamp(volatility, Decimal::ZERO, Decimal::ONE);
    let raw = params.min_spread_bps
        + (params.max_spread_bps - params.min_spread_bps) * vol * params.volatility_multiplier;
    clamp(raw, params.min_spread_bps, params.max_spread_bps)
}

/// Squared position ratio in `[0, 1]`.
pub fn position_factor(position: Decimal, max_position: Decimal) -> Decimal {
    if max_position <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ratio = clamp(position / max_position, Decimal::NEGATIVE_ONE, Decimal::ONE);
    ratio * ratio
}

/// Spread for `side` after position widening (before recovery).
///
/// Only the side that would add to the current exposure is widened:
/// the bid when long, the ask when short.
pub fn side_spread_bps(side: Side, base: Decimal, position: Decimal, params: &QuoterParams) -> Decimal {
    if side.sign() * position > Decimal::ZERO {
        let factor = position_factor(position, params.max_position);
        base * (Decimal::ONE + factor * params.position_spread_scaling)
    } else {
        base
    }
}

/// Volatility-scaled size for `side`, capped by the room left to the
/// position limit and rounded down to the lot size.
pub fn quote_size(
    side: Side,
    volatility: Decimal,
    position: Decimal,
    params: &QuoterParams,
    rounder: &dyn TickRounder,
) -> Size {
    let vol = clamp(volatility, Decimal::ZERO, Decimal::ONE);
    let scaled = params.base_size * (Decimal::ONE - vol * params.size_volatility_sensitivity);
    let sized = clamp(scaled.max(params.min_size), Decimal::ZERO, params.base_size);

    // bid room: max - pos, ask room: max + pos
    let room = params.max_position - side.sign() * position;
    if room <= Decimal::ZERO {
        return Size::ZERO;
    }
    rounder.round_size(Size::new(sized.min(room)))
}

/// Largest spread a valid quote can carry.
fn spread_ceiling(params: &QuoterParams) -> Decimal {
    params.max_spread_bps
        * params.recovery_spread_multiplier
        * (Decimal::ONE + params.position_spread_scaling)
}

/// Compute the decision for one side.
pub fn compute_side(
    side: Side,
    inputs: &MarketInputs,
    phase: Phase,
    params: &QuoterParams,
    rounder: &dyn TickRounder,
) -> QuoteDecision {
    let phase_multiplier = match phase {
        Phase::Normal => Decimal::ONE,
        Phase::Recovery => params.recovery_spread_multiplier,
        Phase::Cooldown => return QuoteDecision::NoQuote(NoQuoteReason::Cooldown),
    };

    // Position limit: no further accumulation in this side's direction.
    if side.sign() * inputs.position >= params.max_position {
        return QuoteDecision::NoQuote(NoQuoteReason::PositionLimit);
    }

    let base = base_spread_bps(inputs.volatility, params);
    let spread_bps = side_spread_bps(side, base, inputs.position, params) * phase_multiplier;

    // bid: mid * (1 - s/10000), ask: mid * (1 + s/10000)
    let raw = inputs.mid.offset_bps(-side.sign() * spread_bps);
    let rounded = rounder.round_price(raw, side);
    let price = match side {
        Side::Bid => rounded.min(inputs.best_bid),
        Side::Ask => rounded.max(inputs.best_ask),
    };

    let size = quote_size(side, inputs.volatility, inputs.position, params, rounder);
    if !size.is_positive() {
        return QuoteDecision::NoQuote(NoQuoteReason::ZeroSize);
    }

    let crosses = match side {
        Side::Bid => price >= inputs.best_ask,
        Side::Ask => price <= inputs.best_bid,
    };
    if !price.is_positive()
        || crosses
        || spread_bps < params.min_spread_bps
        || spread_bps > spread_ceiling(params)
        || size.inner() > params.base_size
    {
        error!(
            side = %side,
            price = %price,
            size = %size,
            spread_bps = %spread_bps,
            best_bid = %inputs.best_bid,
            best_ask = %inputs.best_ask,
            "Quote failed sanity check, side suppressed"
        );
        return QuoteDecision::NoQuote(NoQuoteReason::InvariantViolation);
    }

    QuoteDecision::Quote(TargetQuote {
        side,
        price,
        size,
        spread_bps,
    })
}

/// Compute target quotes for both sides from one snapshot.
///
/// `phases` is indexed by [`Side::index`].
pub fn compute_quotes(
    snapshot: &Snapshot,
    phases: [Phase; 2],
    params: &QuoterParams,
    rounder: &dyn TickRounder,
    now: Instant,
) -> QuotePair {
    let inputs = match MarketInputs::from_snapshot(snapshot, params, now) {
        Ok(inputs) => inputs,
        Err(reason) => return QuotePair::both(reason),
    };
    QuotePair {
        bid: compute_side(Side::Bid, &inputs, phases[Side::Bid.index()], params, rounder),
        ask: compute_side(Side::Ask, &inputs, phases[Side::Ask.index()], params, rounder),
    }
}
