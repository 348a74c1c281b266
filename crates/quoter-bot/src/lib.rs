//! Single-instrument quoting bot.
//!
//! Keeps one post-only bid and one post-only ask around the mid of a
//! perpetual, and orchestrates:
//! - WebSocket session to the exchange
//! - Feed decoding into the shared snapshot
//! - Quote decision, cooldown and order reconciliation per tick
//! - Order execution (exchange or paper venue)
//! - Bookkeeping, metrics and the periodic state summary

pub mod app;
pub mod config;
pub mod error;
pub mod quote_loop;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use quote_loop::QuoteLoop;
