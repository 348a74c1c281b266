//! Quoting logic for a single instrument.
//!
//! - `quote_engine`: target bid/ask from one snapshot (volatility spread,
//!   position widening, tick rounding, crossing protection, sizing)
//! - `cooldown`: per-side fill cooldown / recovery state machine
//! - `reconciler`: target vs working order diff (INSERT / AMEND / CANCEL)
//! - `engine`: the tick loop state owner tying the three together
//! - `volatility`, `bookkeeping`: injected collaborators
//!
//! # Architecture
//!
//! ```text
//! Snapshot ──► QuotingEngine::tick()
//!               ├─ CooldownMachine::advance()   (per side)
//!               ├─ compute_quotes()             → QuotePair
//!               └─ reconcile()                  → OrderCommand
//!                       ↓
//!               ActionExecutor (quoter-executor)
//! ```

pub mod bookkeeping;
pub mod config;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod quote_engine;
pub mod reconciler;
pub mod volatility;

pub use bookkeeping::{FeeLedger, PnlReport, PnlTracker};
pub use config::QuoterParams;
pub use cooldown::{CooldownMachine, Phase, PhaseTransition};
pub use engine::{QuotingEngine, SideState, CANCEL_TIMEOUT};
pub use error::{MmError, MmResult};
pub use quote_engine::{compute_quotes, NoQuoteReason, QuoteDecision, QuotePair, TargetQuote};
pub use reconciler::{reconcile, OrderCommand, QuoteAction};
pub use volatility::{FixedVolatility, RollingVolatility, SharedVolatility, VolatilitySource};
