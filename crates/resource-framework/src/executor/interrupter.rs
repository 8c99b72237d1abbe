//! Cooperative cancellation of an executor run.

use super::context::{ContextCreator, ExecutionContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing::debug;

/// Interruption flag stored in an execution context.
#[derive(Debug, Default)]
pub struct InterruptState {
    interrupted: AtomicBool,
}

impl InterruptState {
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Stops the remaining handlers and chain links of a run.
///
/// Interruption is checked before every handler and every chain link. It never
/// stops post-handlers, and it is not an error: `execute` still returns `Ok`.
/// Once set, the flag is shared by the whole execution tree and any further
/// execution with that context returns immediately.
///
/// ```rust
/// use resource_framework::{ExecutorInterrupter, SyncExecutor};
///
/// let executor = SyncExecutor::<i32>::new();
/// executor.add_handler(|value, ctx| {
///     if *value < 0 {
///         ExecutorInterrupter::interrupt(ctx);
///     }
///     Ok(())
/// });
///
/// let ctx = executor.execute(-1).unwrap();
/// assert!(ExecutorInterrupter::is_interrupted(&ctx));
/// ```
pub struct ExecutorInterrupter;

impl ExecutorInterrupter {
    /// The context token holding the interruption flag.
    pub fn token() -> &'static ContextCreator<InterruptState> {
        static TOKEN: OnceLock<ContextCreator<InterruptState>> = OnceLock::new();
        TOKEN.get_or_init(|| ContextCreator::new(|_| InterruptState::default()))
    }

    pub fn interrupt(ctx: &ExecutionContext) {
        debug!("Execution interrupted");
        ctx.get_context(Self::token())
            .interrupted
            .store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(ctx: &ExecutionContext) -> bool {
        ctx.has_context(Self::token()) && ctx.get_context(Self::token()).is_interrupted()
    }
}
