use super::collection::{ExecutorHandlersCollection, HandlerId, HandlerResult};
use super::context::ExecutionContext;
use crate::error::ExecutorError;
use std::fmt;
use std::sync::Arc;

/// Synchronous event executor.
///
/// Runs its collection's handlers in registration order inside a fresh
/// [`ExecutionContext`] and returns the context so callers can inspect what
/// handlers recorded in it.
pub struct SyncExecutor<T> {
    collection: Arc<ExecutorHandlersCollection<T>>,
    default_data: Option<T>,
}

impl<T: 'static> Default for SyncExecutor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SyncExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("has_default_data", &self.default_data.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> SyncExecutor<T> {
    pub fn new() -> Self {
        Self {
            collection: Arc::new(ExecutorHandlersCollection::new()),
            default_data: None,
        }
    }

    /// An executor whose [`execute_default`](Self::execute_default) runs with `data`.
    pub fn with_default(data: T) -> Self {
        Self {
            collection: Arc::new(ExecutorHandlersCollection::new()),
            default_data: Some(data),
        }
    }

    pub fn collection(&self) -> &Arc<ExecutorHandlersCollection<T>> {
        &self.collection
    }

    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T, &ExecutionContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.collection.add_handler(handler)
    }

    pub fn add_post_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T, &ExecutionContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.collection.add_post_handler(handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.collection.remove_handler(id)
    }

    pub fn before(&self, executor: &SyncExecutor<T>) -> &Self
    where
        T: Clone,
    {
        self.collection.before(executor);
        self
    }

    pub fn next(&self, executor: &SyncExecutor<T>) -> &Self
    where
        T: Clone,
    {
        self.collection.next(executor);
        self
    }

    /// Runs all handlers with `data`.
    ///
    /// A handler error is recorded on the context, post-handlers still run, and
    /// the error is returned.
    pub fn execute(&self, data: T) -> Result<ExecutionContext, ExecutorError> {
        self.execute_scope(data, &[])
    }

    /// Runs with the data given at construction.
    pub fn execute_default(&self) -> Result<ExecutionContext, ExecutorError>
    where
        T: Clone,
    {
        let data = self.default_data.clone().ok_or(ExecutorError::NoData)?;
        self.execute(data)
    }

    /// Runs with extra collections appended after this executor's own.
    pub fn execute_scope(
        &self,
        data: T,
        scope: &[Arc<ExecutorHandlersCollection<T>>],
    ) -> Result<ExecutionContext, ExecutorError> {
        let ctx = ExecutionContext::new();
        self.collection.run(&data, &ctx, scope)?;
        Ok(ctx)
    }

    /// Runs inside an existing context, sharing its values and interruption.
    pub fn execute_in(&self, data: &T, ctx: &ExecutionContext) -> HandlerResult {
        self.collection.run(data, ctx, &[])
    }
}
