//! # Executors
//!
//! Synchronous event pipelines. An executor owns an
//! [`ExecutorHandlersCollection`]; running it walks `before` links, handlers,
//! post-handlers and `next` links in that order, sharing one
//! [`ExecutionContext`] across the whole chain.

mod collection;
mod context;
mod interrupter;
mod sync_executor;

pub use collection::{
    ExecutorHandlersCollection, Handler, HandlerId, HandlerResult, LinkFilter, LinkPosition,
};
pub use context::{ContextCreator, ExecutionContext};
pub use interrupter::{ExecutorInterrupter, InterruptState};
pub use sync_executor::SyncExecutor;
