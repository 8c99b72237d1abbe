//! Per-execution state shared by handlers.

use crate::error::ExecutorError;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CREATOR_ID: AtomicU64 = AtomicU64::new(1);

type AnyContext = Arc<dyn Any + Send + Sync>;
pub(crate) type ErasedFactory = Arc<dyn Fn(&ExecutionContext) -> AnyContext + Send + Sync>;

/// Token identifying a lazily created per-execution value.
///
/// The token carries a default factory. Collections may register their own
/// factory for the token with
/// [`add_context_creator`](crate::ExecutorHandlersCollection::add_context_creator).
/// Whichever factory is active, the value is created at most once per execution
/// tree and then shared by every handler of that run.
///
/// ```rust
/// use resource_framework::{ContextCreator, SyncExecutor};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let counter = ContextCreator::new(|_| AtomicUsize::new(0));
/// let executor = SyncExecutor::<()>::new();
/// for _ in 0..3 {
///     let counter = counter.clone();
///     executor.add_handler(move |_, ctx| {
///         ctx.get_context(&counter).fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     });
/// }
///
/// let ctx = executor.execute(()).unwrap();
/// assert_eq!(ctx.get_context(&counter).load(Ordering::SeqCst), 3);
/// ```
pub struct ContextCreator<C> {
    id: u64,
    factory: Arc<dyn Fn(&ExecutionContext) -> C + Send + Sync>,
}

impl<C> Clone for ContextCreator<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            factory: self.factory.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> ContextCreator<C> {
    pub fn new(factory: impl Fn(&ExecutionContext) -> C + Send + Sync + 'static) -> Self {
        Self {
            id: NEXT_CREATOR_ID.fetch_add(1, Ordering::Relaxed),
            factory: Arc::new(factory),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn erase(
        factory: impl Fn(&ExecutionContext) -> C + Send + Sync + 'static,
    ) -> ErasedFactory {
        Arc::new(move |ctx: &ExecutionContext| Arc::new(factory(ctx)) as AnyContext)
    }
}

#[derive(Default)]
struct ContextStore {
    values: Mutex<Vec<(u64, AnyContext)>>,
    creators: Mutex<Vec<(u64, ErasedFactory)>>,
}

struct ContextInner {
    parent: Option<ExecutionContext>,
    store: Arc<ContextStore>,
    exception: Mutex<Option<ExecutorError>>,
}

/// State of one executor run.
///
/// Chained executors run in child contexts. A child shares its root's context
/// values (and so its interruption state) but records its own exception.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext").finish_non_exhaustive()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                parent: None,
                store: Arc::new(ContextStore::default()),
                exception: Mutex::new(None),
            }),
        }
    }

    /// A context linked to this one.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                parent: Some(self.clone()),
                store: self.inner.store.clone(),
                exception: Mutex::new(None),
            }),
        }
    }

    pub fn parent(&self) -> Option<&ExecutionContext> {
        self.inner.parent.as_ref()
    }

    /// Returns the value for `creator`, creating it on first access.
    pub fn get_context<C: Send + Sync + 'static>(&self, creator: &ContextCreator<C>) -> Arc<C> {
        if let Some(value) = self.lookup(creator.id) {
            if let Ok(value) = value.downcast::<C>() {
                return value;
            }
        }

        let registered = self
            .inner
            .store
            .creators
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| *id == creator.id)
            .map(|(_, factory)| factory.clone());
        // Created outside the lock: factories may read other context values.
        let created: AnyContext = match registered {
            Some(factory) => factory(self),
            None => Arc::new((creator.factory)(self)),
        };

        let value = {
            let mut values = self.inner.store.values.lock();
            match values.iter().find(|(id, _)| *id == creator.id) {
                Some((_, existing)) => existing.clone(),
                None => {
                    values.push((creator.id, created.clone()));
                    created
                }
            }
        };
        // Ids are unique per token, so a slot holds a `C` unless an override
        // factory returned another type.
        match value.downcast::<C>() {
            Ok(value) => value,
            Err(_) => Arc::new((creator.factory)(self)),
        }
    }

    /// `true` if the value for `creator` was already created in this run.
    pub fn has_context<C>(&self, creator: &ContextCreator<C>) -> bool {
        self.lookup(creator.id).is_some()
    }

    /// The exception recorded by this context's run, if any.
    pub fn exception(&self) -> Option<ExecutorError> {
        self.inner.exception.lock().clone()
    }

    pub(crate) fn set_exception(&self, error: ExecutorError) {
        *self.inner.exception.lock() = Some(error);
    }

    pub(crate) fn register_creator(&self, id: u64, factory: ErasedFactory) {
        self.inner.store.creators.lock().push((id, factory));
    }

    fn lookup(&self, id: u64) -> Option<AnyContext> {
        self.inner
            .store
            .values
            .lock()
            .iter()
            .find(|(stored, _)| *stored == id)
            .map(|(_, value)| value.clone())
    }
}
