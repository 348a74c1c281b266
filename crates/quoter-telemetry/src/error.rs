use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Cannot install log subscriber: {0}")]
    LoggingInit(String),

    #[error("Metrics export failed: {0}")]
    Metrics(String),

    #[error("Summary encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
