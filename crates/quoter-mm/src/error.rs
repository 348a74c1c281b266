//! Error types for quoter-mm.

use thiserror::Error;

/// Quoting errors.
///
/// Only configuration problems surface as errors; runtime anomalies are
/// logged and the affected side is left unquoted for the tick.
#[derive(Debug, Error)]
pub enum MmError {
    #[error("Invalid quoter configuration: {0}")]
    InvalidConfig(String),

    #[error("Core error: {0}")]
    Core(#[from] quoter_core::CoreError),
}

pub type MmResult<T> = Result<T, MmError>;
