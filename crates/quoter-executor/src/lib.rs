//! Order command execution.
//!
//! - [`ActionExecutor`]: transport-agnostic sink for [`OrderCommand`]s
//! - [`WsActionExecutor`]: JSON-RPC over the streaming session
//! - [`PaperExchange`]: in-process venue for dry runs and tests
//! - [`MockExecutor`]: records commands
//!
//! Submission is fire-and-forget. Acknowledgments, fills and errors come
//! back later as feed events.
//!
//! [`OrderCommand`]: quoter_mm::OrderCommand

pub mod error;
pub mod paper;
pub mod ws_executor;
pub mod ws_sender;

pub use error::{ExecutorError, ExecutorResult};
pub use paper::PaperExchange;
pub use ws_executor::WsActionExecutor;
pub use ws_sender::{ActionExecutor, BoxFuture, DynActionExecutor, MockExecutor};
