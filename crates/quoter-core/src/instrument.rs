//! Instrument specification and tick rounding.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// Rounds raw quote prices and sizes to what the venue accepts.
pub trait TickRounder: Send + Sync {
    /// Round a raw quote price for `side`.
    fn round_price(&self, price: Price, side: Side) -> Price;

    /// Round a raw quote size (never up).
    fn round_size(&self, size: Size) -> Size;
}

/// Static instrument parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Instrument name (e.g. `BTC-PERPETUAL`).
    pub name: String,

    /// Minimum price increment.
    pub price_tick: Price,

    /// Minimum size increment.
    pub size_tick: Size,
}

impl InstrumentSpec {
    pub fn new(name: impl Into<String>, price_tick: Price, size_tick: Size) -> Result<Self> {
        if !price_tick.is_positive() {
            return Err(CoreError::InvalidPrice(format!(
                "price tick must be positive, got {price_tick}"
            )));
        }
        if !size_tick.is_positive() {
            return Err(CoreError::InvalidSize(format!(
                "size tick must be positive, got {size_tick}"
            )));
        }
        Ok(Self {
            name: name.into(),
            price_tick,
            size_tick,
        })
    }
}

impl TickRounder for InstrumentSpec {
    /// Passive rounding: bids round down, asks round up, so rounding never
    /// moves a quote toward the mid.
    fn round_price(&self, price: Price, side: Side) -> Price {
        match side {
            Side::Bid => price.floor_to_tick(self.price_tick),
            Side::Ask => price.ceil_to_tick(self.price_tick),
        }
    }

    fn round_size(&self, size: Size) -> Size {
        size.round_to_lot(self.size_tick)
    }
}
