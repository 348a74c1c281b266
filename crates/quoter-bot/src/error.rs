//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<quoter_ws::WsError>),

    #[error("Feed error: {0}")]
    Feed(#[from] quoter_feed::FeedError),

    #[error("Quoting error: {0}")]
    Mm(#[from] quoter_mm::MmError),

    #[error("Instrument error: {0}")]
    Core(#[from] quoter_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] quoter_telemetry::TelemetryError),

    #[error("Executor error: {0}")]
    Executor(#[from] quoter_executor::ExecutorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
