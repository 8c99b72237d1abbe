//! Ordered handler lists, chain links and the execution algorithm.

use super::context::{ContextCreator, ErasedFactory, ExecutionContext};
use super::interrupter::ExecutorInterrupter;
use super::sync_executor::SyncExecutor;
use crate::error::ExecutorError;
use parking_lot::RwLock;
use std::iter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Result of a handler or of a whole run.
pub type HandlerResult = Result<(), ExecutorError>;

/// A handler receives the run's data and context.
///
/// Handlers share data by reference; use interior mutability for state that
/// handlers update.
pub type Handler<T> = Arc<dyn Fn(&T, &ExecutionContext) -> HandlerResult + Send + Sync>;

/// Decides whether a chain link runs for the given data.
pub type LinkFilter<T> = Arc<dyn Fn(&T, &ExecutionContext) -> bool + Send + Sync>;

type LinkRunner<T> = Arc<dyn Fn(&T, &ExecutionContext) -> HandlerResult + Send + Sync>;

/// Identifies a registered handler for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a linked executor runs relative to the owning collection's handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPosition {
    Before,
    Next,
}

struct ChainLink<T> {
    position: LinkPosition,
    run: LinkRunner<T>,
}

struct CollectionState<T> {
    handlers: Vec<(HandlerId, Handler<T>)>,
    post_handlers: Vec<(HandlerId, Handler<T>)>,
    links: Vec<ChainLink<T>>,
    context_creators: Vec<(u64, ErasedFactory)>,
    collections: Vec<Arc<ExecutorHandlersCollection<T>>>,
}

/// Handlers, post-handlers, chain links, context creators and nested collections
/// of one executor.
///
/// Registration is append-only and handlers are looked up by index while a run
/// is in progress, so a handler added during a run still runs in that run if it
/// lands after the current position.
pub struct ExecutorHandlersCollection<T> {
    state: RwLock<CollectionState<T>>,
}

impl<T: 'static> Default for ExecutorHandlersCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ExecutorHandlersCollection<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CollectionState {
                handlers: Vec::new(),
                post_handlers: Vec::new(),
                links: Vec::new(),
                context_creators: Vec::new(),
                collections: Vec::new(),
            }),
        }
    }

    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T, &ExecutionContext) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId::next();
        self.state.write().handlers.push((id, Arc::new(handler)));
        id
    }

    /// Adds a handler that runs after the regular handlers, even when one of
    /// them failed or interrupted the run.
    pub fn add_post_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T, &ExecutionContext) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId::next();
        self.state.write().post_handlers.push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler or post-handler. Returns `false` if it was not registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut state = self.state.write();
        let before = state.handlers.len() + state.post_handlers.len();
        state.handlers.retain(|(handler_id, _)| *handler_id != id);
        state.post_handlers.retain(|(handler_id, _)| *handler_id != id);
        before != state.handlers.len() + state.post_handlers.len()
    }

    pub fn handlers_len(&self) -> usize {
        self.state.read().handlers.len()
    }

    pub fn post_handlers_len(&self) -> usize {
        self.state.read().post_handlers.len()
    }

    /// Overrides how `token`'s value is created during runs of this collection.
    pub fn add_context_creator<C, F>(&self, token: &ContextCreator<C>, factory: F) -> &Self
    where
        C: Send + Sync + 'static,
        F: Fn(&ExecutionContext) -> C + Send + Sync + 'static,
    {
        self.state
            .write()
            .context_creators
            .push((token.id(), ContextCreator::erase(factory)));
        self
    }

    /// Nests a collection that always runs alongside this one.
    pub fn add_collection(&self, collection: Arc<ExecutorHandlersCollection<T>>) -> &Self {
        self.state.write().collections.push(collection);
        self
    }

    pub fn remove_collection(&self, collection: &Arc<ExecutorHandlersCollection<T>>) -> bool {
        let mut state = self.state.write();
        let before = state.collections.len();
        state.collections.retain(|nested| !Arc::ptr_eq(nested, collection));
        before != state.collections.len()
    }

    /// Runs `executor` with the same data before this collection's handlers.
    pub fn before(&self, executor: &SyncExecutor<T>) -> &Self
    where
        T: Clone,
    {
        self.link(LinkPosition::Before, executor, |data: &T, _: &ExecutionContext| data.clone(), None);
        self
    }

    /// Runs `executor` with the same data after this collection's post-handlers.
    pub fn next(&self, executor: &SyncExecutor<T>) -> &Self
    where
        T: Clone,
    {
        self.link(LinkPosition::Next, executor, |data: &T, _: &ExecutionContext| data.clone(), None);
        self
    }

    /// Links `executor` before this collection, mapping the data.
    ///
    /// Returns the link's own handler collection; its handlers run as extra scope
    /// of the linked executor, only when reached through this link.
    pub fn before_map<U, M>(&self, executor: &SyncExecutor<U>, map: M) -> Arc<ExecutorHandlersCollection<U>>
    where
        U: 'static,
        M: Fn(&T, &ExecutionContext) -> U + Send + Sync + 'static,
    {
        self.link(LinkPosition::Before, executor, map, None)
    }

    /// Links `executor` after this collection, mapping the data.
    pub fn next_map<U, M>(&self, executor: &SyncExecutor<U>, map: M) -> Arc<ExecutorHandlersCollection<U>>
    where
        U: 'static,
        M: Fn(&T, &ExecutionContext) -> U + Send + Sync + 'static,
    {
        self.link(LinkPosition::Next, executor, map, None)
    }

    /// Adds a chain link with an optional data mapping filter.
    pub fn link<U, M>(
        &self,
        position: LinkPosition,
        executor: &SyncExecutor<U>,
        map: M,
        filter: Option<LinkFilter<T>>,
    ) -> Arc<ExecutorHandlersCollection<U>>
    where
        U: 'static,
        M: Fn(&T, &ExecutionContext) -> U + Send + Sync + 'static,
    {
        let target = executor.collection().clone();
        let link_handlers = Arc::new(ExecutorHandlersCollection::<U>::new());
        let scope = link_handlers.clone();

        let run: LinkRunner<T> = Arc::new(move |data: &T, ctx: &ExecutionContext| {
            if let Some(filter) = &filter {
                if !filter(data, ctx) {
                    return Ok(());
                }
            }
            let mapped = map(data, ctx);
            target.run(&mapped, &ctx.child(), std::slice::from_ref(&scope))
        });
        self.state.write().links.push(ChainLink { position, run });
        link_handlers
    }

    /// Executes this collection with `data` in `ctx`.
    ///
    /// Order: `before` links, handlers, post-handlers, `next` links. Base
    /// collection first, then nested collections, then `scope`.
    pub(crate) fn run(&self, data: &T, ctx: &ExecutionContext, scope: &[Arc<ExecutorHandlersCollection<T>>]) -> HandlerResult {
        if ExecutorInterrupter::is_interrupted(ctx) {
            debug!("Skipping execution of interrupted context");
            return Ok(());
        }

        let mut scoped = self.state.read().collections.clone();
        scoped.extend(scope.iter().cloned());

        for collection in self.with_scope(&scoped) {
            for (id, factory) in collection.state.read().context_creators.iter() {
                ctx.register_creator(*id, factory.clone());
            }
        }

        self.run_links(LinkPosition::Before, data, ctx, &scoped)?;

        let result = self.run_handlers(data, ctx, &scoped);
        if let Err(error) = &result {
            warn!(error = %error, "Handler failed");
            ctx.set_exception(error.clone());
        }
        let post_result = self.run_post_handlers(data, ctx, &scoped);
        result?;
        post_result?;

        self.run_links(LinkPosition::Next, data, ctx, &scoped)
    }

    fn with_scope<'a>(&'a self, scoped: &'a [Arc<ExecutorHandlersCollection<T>>]) -> impl Iterator<Item = &'a ExecutorHandlersCollection<T>> {
        iter::once(self).chain(scoped.iter().map(|collection| collection.as_ref()))
    }

    fn run_links(&self, position: LinkPosition, data: &T, ctx: &ExecutionContext, scoped: &[Arc<ExecutorHandlersCollection<T>>]) -> HandlerResult {
        for collection in self.with_scope(scoped) {
            let links: Vec<LinkRunner<T>> = collection
                .state
                .read()
                .links
                .iter()
                .filter(|link| link.position == position)
                .map(|link| link.run.clone())
                .collect();
            for link in links {
                if ExecutorInterrupter::is_interrupted(ctx) {
                    return Ok(());
                }
                link(data, ctx)?;
            }
        }
        Ok(())
    }

    fn run_handlers(&self, data: &T, ctx: &ExecutionContext, scoped: &[Arc<ExecutorHandlersCollection<T>>]) -> HandlerResult {
        for collection in self.with_scope(scoped) {
            let mut index = 0;
            while let Some(handler) = collection.handler_at(index) {
                if ExecutorInterrupter::is_interrupted(ctx) {
                    return Ok(());
                }
                handler(data, ctx)?;
                index += 1;
            }
        }
        Ok(())
    }

    fn run_post_handlers(&self, data: &T, ctx: &ExecutionContext, scoped: &[Arc<ExecutorHandlersCollection<T>>]) -> HandlerResult {
        let mut first_error = None;
        for collection in self.with_scope(scoped) {
            let mut index = 0;
            while let Some(handler) = collection.post_handler_at(index) {
                if let Err(error) = handler(data, ctx) {
                    warn!(error = %error, "Post handler failed");
                    first_error.get_or_insert(error);
                }
                index += 1;
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn handler_at(&self, index: usize) -> Option<Handler<T>> {
        self.state.read().handlers.get(index).map(|(_, handler)| handler.clone())
    }

    fn post_handler_at(&self, index: usize) -> Option<Handler<T>> {
        self.state
            .read()
            .post_handlers
            .get(index)
            .map(|(_, handler)| handler.clone())
    }
}
