//! Action executor trait.
//!
//! Abstracts where order commands go, so the quoting loop can run against
//! the live session, the paper venue or a recording mock.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quoter_mm::OrderCommand;

use crate::error::{ExecutorError, ExecutorResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Sink for order commands.
pub trait ActionExecutor: Send + Sync {
    /// Queue one command. `Ok` means it was handed to the venue, not that
    /// the venue accepted it.
    fn submit(&self, command: OrderCommand) -> BoxFuture<'_, ExecutorResult<()>>;

    /// Ask for the list of our working orders. Answered by a feed event.
    fn request_open_orders(&self) -> BoxFuture<'_, ExecutorResult<()>>;

    /// Cancel every order of the session on the way out.
    fn cancel_session(&self) -> BoxFuture<'_, ExecutorResult<()>>;

    fn is_ready(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Arc wrapper for executor trait objects.
pub type DynActionExecutor = Arc<dyn ActionExecutor>;

/// Executor that records what it is asked to do.
#[derive(Debug)]
pub struct MockExecutor {
    commands: Mutex<Vec<OrderCommand>>,
    next_error: Mutex<Option<ExecutorError>>,
    open_order_requests: AtomicUsize,
    session_cancels: AtomicUsize,
    ready: AtomicBool,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            open_order_requests: AtomicUsize::new(0),
            session_cancels: AtomicUsize::new(0),
            ready: AtomicBool::new(true),
        }
    }

    /// Fail the next submission with `error`.
    pub fn fail_next(&self, error: ExecutorError) {
        *self.next_error.lock() = Some(error);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<OrderCommand> {
        self.commands.lock().clone()
    }

    /// Take and clear the recorded commands.
    pub fn take_commands(&self) -> Vec<OrderCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn open_order_requests(&self) -> usize {
        self.open_order_requests.load(Ordering::SeqCst)
    }

    pub fn session_cancels(&self) -> usize {
        self.session_cancels.load(Ordering::SeqCst)
    }
}

impl ActionExecutor for MockExecutor {
    fn submit(&self, command: OrderCommand) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            if let Some(error) = self.next_error.lock().take() {
                return Err(error);
            }
            self.commands.lock().push(command);
            Ok(())
        })
    }

    fn request_open_orders(&self) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            self.open_order_requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn cancel_session(&self) -> BoxFuture<'_, ExecutorResult<()>> {
        Box::pin(async move {
            self.session_cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
