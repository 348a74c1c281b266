//! Core domain types for the quoting bot.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Side`, `OrderId`, `Order`, `OrderStatus`: working order model
//! - `Fill`, `OrderUpdate`: feedback events from the venue
//! - `Snapshot`: one consistent market/account view per tick
//! - `InstrumentSpec`, `TickRounder`: tick and lot rounding

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod order;
pub mod snapshot;

pub use decimal::{Price, Size, BPS_DIVISOR};
pub use error::{CoreError, Result};
pub use instrument::{InstrumentSpec, TickRounder};
pub use order::{Fill, Order, OrderId, OrderIdGenerator, OrderStatus, OrderUpdate, Side};
pub use snapshot::{AccountSummary, BookState, Snapshot};
