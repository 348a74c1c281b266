//! Executor error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),
}

impl From<quoter_ws::SendError> for ExecutorError {
    fn from(e: quoter_ws::SendError) -> Self {
        match e {
            quoter_ws::SendError::NotConnected => Self::NotConnected,
            quoter_ws::SendError::ChannelClosed => Self::ChannelClosed,
            quoter_ws::SendError::Encode(msg) => Self::Encode(msg),
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
