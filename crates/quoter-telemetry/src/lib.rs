//! Observability for the quoter.
//!
//! - Prometheus metrics behind the [`Metrics`] facade
//! - Structured logging with tracing (JSON in production)
//! - Periodic state summary logged every `log_interval`

pub mod error;
pub mod logging;
pub mod metrics;
pub mod summary;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use summary::{OrderView, StateSummary, SummaryReporter};
