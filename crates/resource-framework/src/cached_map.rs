//! # Cached Map Resource
//!
//! [`CachedMapResource`] wraps a [`MapResource`] with a key → value cache, a
//! [`ResourceMetadata`] store, a [`ResourceAliases`] registry and five lifecycle
//! executors.
//!
//! ## Load Path
//!
//! 1. The key is validated; concrete keys are checked with
//!    [`MapResource::validate_key`], aliases must be registered.
//! 2. If every addressed entry is loaded and none is outdated, cached values are
//!    returned without calling the loader.
//! 3. Otherwise the load registers an in-flight *flight* covering its metadata keys.
//!    A load whose keys overlap a running flight waits for it and re-checks instead
//!    of calling the loader again, so at most one loader runs per key. If that
//!    flight fails, its error is returned only when it covered every key of the
//!    waiting load; otherwise the waiter loads its key itself.
//! 4. The loader commits data through [`LoadContext`]. On success every covered entry
//!    is marked loaded and `on_data_update` fires. On failure the error is stored
//!    in the entries' metadata, `on_data_error` fires, and `load` returns the error.
//!    A failed entry is never marked loaded, so the next `load` retries. Resolving
//!    an alias after its loader succeeded can still fail; that counts as a failed load.
//!
//! ## Pages
//!
//! Offset pages share the metadata of their parent list. Each page load records
//! the keys it wrote at their list positions, and a loaded page resolves to those
//! keys. A load of the whole list drops the records; its pages then slice the
//! resolved list.
//!
//! ## Deletes during a load
//!
//! `delete` records the removed keys on every running flight. Writes the loader
//! makes afterwards for those keys are dropped, and the flight does not recreate
//! their metadata when it completes.
//!
//! ## Lifecycle Executors
//!
//! | Executor | Fires on | Data |
//! |----------|----------|------|
//! | `on_data_outdated` | [`CachedMapResource::mark_outdated`] | the key |
//! | `on_data_update` | successful load | the loaded key |
//! | `on_item_update` | [`CachedMapResource::set`], [`CachedMapResource::replace`] | written keys |
//! | `on_item_delete` | [`CachedMapResource::delete`], [`CachedMapResource::replace`], [`CachedMapResource::clear`] | removed keys |
//! | `on_data_error` | failed load | [`DataError`] |
//!
//! Handler failures are logged and never fail the cache operation that fired them.

use crate::alias::ResourceAliases;
use crate::error::ResourceError;
use crate::executor::SyncExecutor;
use crate::key::{AliasFactory, ResourceAlias, ResourceKey, OFFSET_PAGE_ALIAS_ID};
use crate::metadata::{
    CachedResourceMetadata, KeyEquality, MetadataChange, MetadataKeyRef, ResourceMetadata,
};
use crate::options::ResourceOptions;
use crate::resource::MapResource;
use parking_lot::{Mutex, RwLock};
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

/// Built-in list alias resolving to every cached key, in insertion order (or the
/// order of the last `replace`).
pub const ALL_KEYS: AliasFactory = AliasFactory::list("@cached-map/all");

type Metadata<R> =
    CachedResourceMetadata<<R as MapResource>::Key, <R as MapResource>::Extension>;

/// Payload of `on_data_error`.
#[derive(Debug, Clone)]
pub struct DataError<K> {
    /// The key whose load failed.
    pub param: ResourceKey<K>,
    /// The error stored in the key's metadata.
    pub exception: ResourceError,
}

/// Shared, insertion-ordered storage of cached entries.
///
/// Cloning yields another handle to the same entries. Alias resolvers receive one
/// to derive keys from loaded data; writes go through [`CachedMapResource`].
pub struct DataMap<K, V> {
    entries: Arc<RwLock<Vec<(K, V)>>>,
    is_key_equal: KeyEquality<K>,
}

impl<K, V> Clone for DataMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            is_key_equal: self.is_key_equal.clone(),
        }
    }
}

impl<K: Debug, V: Debug> Debug for DataMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.read().iter()).finish()
    }
}

impl<K: Clone, V: Clone> DataMap<K, V> {
    fn new(is_key_equal: KeyEquality<K>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            is_key_equal,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .iter()
            .find(|(stored, _)| (self.is_key_equal)(stored, key))
            .map(|(_, value)| value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .read()
            .iter()
            .any(|(stored, _)| (self.is_key_equal)(stored, key))
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.read().iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.entries.read().iter().map(|(_, value)| value.clone()).collect()
    }

    /// Entries matching `predicate`, in insertion order.
    pub fn filter(&self, predicate: impl Fn(&K, &V) -> bool) -> Vec<(K, V)> {
        self.entries
            .read()
            .iter()
            .filter(|(key, value)| predicate(key, value))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        match entries
            .iter_mut()
            .find(|(stored, _)| (self.is_key_equal)(stored, &key))
        {
            Some((_, existing)) => *existing = value,
            None => entries.push((key, value)),
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write();
        let index = entries
            .iter()
            .position(|(stored, _)| (self.is_key_equal)(stored, key))?;
        Some(entries.remove(index).1)
    }

    // Sorts entries into the order of `keys`; entries not listed keep their place after them.
    fn reorder(&self, keys: &[K]) {
        let position = |key: &K| {
            keys.iter()
                .position(|wanted| (self.is_key_equal)(wanted, key))
                .unwrap_or(keys.len())
        };
        self.entries.write().sort_by_key(|(key, _)| position(key));
    }

    fn drain(&self) -> Vec<K> {
        self.entries.write().drain(..).map(|(key, _)| key).collect()
    }
}

/// A running loader invocation.
struct Flight<K> {
    key: ResourceKey<K>,
    refs: Vec<MetadataKeyRef<K>>,
    // Keys the loader committed, in commit order.
    written: Mutex<Vec<K>>,
    // Keys deleted while this flight was running.
    deleted: Mutex<Vec<MetadataKeyRef<K>>>,
    done: watch::Sender<Option<Result<(), ResourceError>>>,
}

/// Removes its flight from the in-flight list when the load finishes or its
/// future is dropped. Waiters of a dropped flight see the channel close and retry.
struct FlightGuard<'a, R: MapResource> {
    cache: &'a CachedMapResource<R>,
    flight: Arc<Flight<R::Key>>,
    finished: bool,
}

impl<'a, R: MapResource> FlightGuard<'a, R> {
    fn finish(mut self, result: Result<(), ResourceError>) {
        self.finished = true;
        self.cache.remove_flight(&self.flight);
        // Removed first: a woken waiter must not find the finished flight again.
        self.flight.done.send_replace(Some(result));
    }
}

impl<R: MapResource> Drop for FlightGuard<'_, R> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!(resource = self.cache.name(), "Load cancelled");
        self.cache.remove_flight(&self.flight);
        let live = self.cache.live_refs(&self.flight, &self.flight.refs);
        self.cache.metadata.update_ref(&live, |m| m.loading = false);
    }
}

enum LoadStep<K> {
    Ready,
    Wait(Arc<Flight<K>>, watch::Receiver<Option<Result<(), ResourceError>>>),
    Lead(Arc<Flight<K>>),
}

/// Write handle passed to [`MapResource::loader`].
pub struct LoadContext<'a, R: MapResource> {
    cache: &'a CachedMapResource<R>,
    flight: &'a Flight<R::Key>,
}

impl<'a, R: MapResource> LoadContext<'a, R> {
    /// Caches `value` under `key`. Dropped if `key` was deleted after the load started.
    pub fn set(&self, key: R::Key, value: R::Value) -> Result<(), ResourceError> {
        self.cache.validate_concrete(&key)?;
        if self.cache.is_deleted(self.flight, &key) {
            debug!(resource = self.cache.name(), ?key, "Skipping write of deleted key");
            return Ok(());
        }
        self.cache.record_written(self.flight, [&key]);
        self.cache.write_entries(vec![(key, value)]);
        Ok(())
    }

    /// Replaces the whole cache with `keys` → `values`, see [`CachedMapResource::replace`].
    /// Pairs whose key was deleted after the load started are left out.
    pub fn replace(&self, keys: Vec<R::Key>, values: Vec<R::Value>) -> Result<(), ResourceError> {
        let pairs = self.cache.pair(keys, values)?;
        let pairs = pairs
            .into_iter()
            .filter(|(key, _)| !self.cache.is_deleted(self.flight, key))
            .collect::<Vec<_>>();
        self.cache.record_written(self.flight, pairs.iter().map(|(key, _)| key));
        self.cache.replace_pairs(pairs);
        Ok(())
    }

    pub fn delete(&self, key: &ResourceKey<R::Key>) -> Result<(), ResourceError> {
        self.cache.delete_from(key, Some(self.flight))
    }

    /// Fully resolves an alias to the concrete keys it stands for.
    pub fn resolve(&self, key: &ResourceKey<R::Key>) -> Result<ResourceKey<R::Key>, ResourceError> {
        self.cache.resolve(key)
    }

    /// The cache being loaded, for reads.
    pub fn resource(&self) -> &CachedMapResource<R> {
        self.cache
    }
}

/// A cache over a [`MapResource`].
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct CachedMapResource<R: MapResource> {
    resource: Arc<R>,
    aliases: Arc<ResourceAliases<R::Key>>,
    metadata: ResourceMetadata<R::Key, Metadata<R>>,
    data: DataMap<R::Key, R::Value>,
    in_flight: Mutex<Vec<Arc<Flight<R::Key>>>>,
    pub on_data_outdated: SyncExecutor<ResourceKey<R::Key>>,
    pub on_data_update: SyncExecutor<ResourceKey<R::Key>>,
    pub on_item_update: SyncExecutor<ResourceKey<R::Key>>,
    pub on_item_delete: SyncExecutor<ResourceKey<R::Key>>,
    pub on_data_error: SyncExecutor<DataError<R::Key>>,
}

impl<R: MapResource> CachedMapResource<R> {
    pub fn new(resource: R) -> Self {
        Self::with_options(resource, ResourceOptions::default())
    }

    pub fn with_options(resource: R, options: ResourceOptions) -> Self {
        let resource = Arc::new(resource);
        let aliases = Arc::new(ResourceAliases::new(
            resource.name(),
            options.max_alias_depth,
        ));

        let owner = resource.clone();
        let is_key_equal: KeyEquality<R::Key> =
            Arc::new(move |a: &R::Key, b: &R::Key| owner.is_key_equal(a, b));
        let data = DataMap::new(is_key_equal.clone());

        let keys = data.clone();
        aliases.add(&ALL_KEYS, move |_| ResourceKey::List(keys.keys()));
        aliases.add_with_transform(OFFSET_PAGE_ALIAS_ID, resolve_page_parent, slice_page);
        resource.register_aliases(&aliases, &data);

        let metadata = ResourceMetadata::new(aliases.clone(), is_key_equal, options.change_buffer);
        info!(resource = resource.name(), "Resource created");

        Self {
            resource,
            aliases,
            metadata,
            data,
            in_flight: Mutex::new(Vec::new()),
            on_data_outdated: SyncExecutor::new(),
            on_data_update: SyncExecutor::new(),
            on_item_update: SyncExecutor::new(),
            on_item_delete: SyncExecutor::new(),
            on_data_error: SyncExecutor::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.resource.name()
    }

    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    pub fn aliases(&self) -> &Arc<ResourceAliases<R::Key>> {
        &self.aliases
    }

    pub fn metadata(&self) -> &ResourceMetadata<R::Key, Metadata<R>> {
        &self.metadata
    }

    /// Read handle on the cached entries.
    pub fn data(&self) -> &DataMap<R::Key, R::Value> {
        &self.data
    }

    pub fn subscribe_metadata(&self) -> broadcast::Receiver<MetadataChange<R::Key>> {
        self.metadata.subscribe()
    }

    // --- Loading ---

    /// Loads `key` unless it is already loaded and fresh.
    ///
    /// Returns the values of the keys `key` resolves to, positionally; `None` for
    /// keys the loader did not provide.
    #[instrument(level = "debug", skip_all, fields(resource = self.name(), key = %key))]
    pub async fn load(
        &self,
        key: ResourceKey<R::Key>,
    ) -> Result<Vec<Option<R::Value>>, ResourceError> {
        self.validate(&key)?;

        loop {
            if self.is_fresh(&key)? {
                return self.get_many(&key);
            }
            let refs = self.metadata.get_metadata_key_ref(&key)?;

            let step = {
                let mut in_flight = self.in_flight.lock();
                if let Some(flight) = in_flight.iter().find(|f| self.overlaps(&f.refs, &refs)) {
                    LoadStep::Wait(flight.clone(), flight.done.subscribe())
                } else if self.is_fresh(&key)? {
                    LoadStep::Ready
                } else {
                    let flight = Arc::new(Flight {
                        key: key.clone(),
                        refs: refs.clone(),
                        written: Mutex::new(Vec::new()),
                        deleted: Mutex::new(Vec::new()),
                        done: watch::channel(None).0,
                    });
                    in_flight.push(flight.clone());
                    LoadStep::Lead(flight)
                }
            };

            match step {
                LoadStep::Ready => return self.get_many(&key),
                LoadStep::Wait(leader, mut done) => {
                    debug!("Waiting for in-flight load");
                    let outcome = done
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|result| result.clone());
                    // The leader's error only answers keys it was loading itself.
                    if let Some(Err(error)) = outcome {
                        if self.answers(&leader, &key, &refs) {
                            return Err(error);
                        }
                        debug!(error = %error, "In-flight load failed, loading remaining keys");
                    }
                }
                LoadStep::Lead(flight) => {
                    let guard = FlightGuard {
                        cache: self,
                        flight,
                        finished: false,
                    };
                    let result = self.run_loader(&key, &guard.flight).await;
                    guard.finish(result.clone());
                    result?;
                    return self.get_many(&key);
                }
            }
        }
    }

    /// Loads a single key.
    pub async fn load_one(&self, key: R::Key) -> Result<Option<R::Value>, ResourceError> {
        let values = self.load(ResourceKey::Flat(key)).await?;
        Ok(values.into_iter().next().flatten())
    }

    /// Marks `key` outdated and loads it again.
    pub async fn refresh(
        &self,
        key: ResourceKey<R::Key>,
    ) -> Result<Vec<Option<R::Value>>, ResourceError> {
        self.mark_outdated(&key)?;
        self.load(key).await
    }

    async fn run_loader(
        &self,
        key: &ResourceKey<R::Key>,
        flight: &Flight<R::Key>,
    ) -> Result<(), ResourceError> {
        self.metadata.update_ref(&flight.refs, |m| m.loading = true);
        debug!("Loader started");

        let ctx = LoadContext { cache: self, flight };
        let result = match self.resource.loader(key, &ctx).await {
            Ok(()) => self.commit_loaded(key, flight),
            Err(error) => Err(ResourceError::loader(error)),
        };
        match result {
            Ok(()) => {
                info!(size = self.data.len(), "Loaded");
                self.broadcast(&self.on_data_update, "data_update", key.clone());
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "Load failed");
                let live = self.live_refs(flight, &flight.refs);
                self.metadata.update_ref(&live, |m| {
                    m.loading = false;
                    m.exception = Some(error.clone());
                });
                self.broadcast(
                    &self.on_data_error,
                    "data_error",
                    DataError {
                        param: key.clone(),
                        exception: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    fn commit_loaded(
        &self,
        key: &ResourceKey<R::Key>,
        flight: &Flight<R::Key>,
    ) -> Result<(), ResourceError> {
        let live = self.live_refs(flight, &flight.refs);

        // A page records what its load wrote; those keys are already marked loaded.
        if let Some((offset, limit)) = key.as_alias().and_then(ResourceAlias::page) {
            let written = flight.written.lock().clone();
            self.metadata.update_ref(&live, |m| {
                let pagination = m.offset_page.get_or_insert_with(Default::default);
                if m.outdated {
                    pagination.reset();
                }
                pagination.commit_page(offset, limit, written.clone());
                m.outdated = false;
                m.exception = None;
                m.loading = false;
            });
            return Ok(());
        }

        let concrete = if key.is_alias() {
            let resolved = self.resolve(key)?;
            self.metadata.get_metadata_key_ref(&resolved)?
        } else {
            Vec::new()
        };
        self.metadata.update_ref(&live, |m| {
            mark_loaded(m);
            m.offset_page = None;
        });
        let live = self.live_refs(flight, &concrete);
        self.metadata.update_ref(&live, mark_loaded);
        Ok(())
    }

    // --- Reads ---

    pub fn get(&self, key: &R::Key) -> Option<R::Value> {
        self.data.get(key)
    }

    /// Values of the keys `key` resolves to, positionally. Never loads.
    pub fn get_many(&self, key: &ResourceKey<R::Key>) -> Result<Vec<Option<R::Value>>, ResourceError> {
        let resolved = self.resolve(key)?;
        let values = resolved
            .concrete_keys()
            .unwrap_or_default()
            .into_iter()
            .map(|key| self.data.get(key))
            .collect();
        Ok(values)
    }

    pub fn has(&self, key: &R::Key) -> bool {
        self.data.contains(key)
    }

    pub fn keys(&self) -> Vec<R::Key> {
        self.data.keys()
    }

    pub fn values(&self) -> Vec<R::Value> {
        self.data.values()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // --- Writes ---

    /// Caches `value` under `key`, marks it loaded and fires `on_item_update`.
    pub fn set(&self, key: R::Key, value: R::Value) -> Result<(), ResourceError> {
        self.validate_concrete(&key)?;
        self.write_entries(vec![(key, value)]);
        Ok(())
    }

    /// Replaces the cache contents with `keys` → `values`, correlated by position.
    ///
    /// Keys not in `keys` are removed (firing `on_item_delete`); afterwards the
    /// cache holds exactly `keys.len()` entries.
    pub fn replace(&self, keys: Vec<R::Key>, values: Vec<R::Value>) -> Result<(), ResourceError> {
        let pairs = self.pair(keys, values)?;
        self.replace_pairs(pairs);
        Ok(())
    }

    /// Removes the value and metadata of every key `key` resolves to and fires
    /// `on_item_delete`.
    pub fn delete(&self, key: &ResourceKey<R::Key>) -> Result<(), ResourceError> {
        self.delete_from(key, None)
    }

    /// Flags `key` outdated without removing its value and fires `on_data_outdated`.
    pub fn mark_outdated(&self, key: &ResourceKey<R::Key>) -> Result<(), ResourceError> {
        let refs = self.metadata.get_metadata_key_ref(key)?;
        self.metadata.update_ref(&refs, |m| m.outdated = true);
        debug!(resource = self.name(), %key, "Marked outdated");
        self.broadcast(&self.on_data_outdated, "data_outdated", key.clone());
        Ok(())
    }

    /// Removes every entry and all metadata.
    pub fn clear(&self) {
        let removed = self.data.drain();
        let refs = self.metadata.keys();
        self.record_deleted(&refs, None);
        self.metadata.clear();
        info!(resource = self.name(), removed = removed.len(), "Cleared");
        if !removed.is_empty() {
            self.broadcast(&self.on_item_delete, "item_delete", ResourceKey::List(removed));
        }
    }

    // --- Metadata projections ---

    /// `true` if every entry `key` addresses is loaded.
    ///
    /// A page of a list alias is loaded if the whole list is, or if the page's
    /// range was loaded since the list was last outdated.
    pub fn is_loaded(&self, key: &ResourceKey<R::Key>) -> Result<bool, ResourceError> {
        let refs = self.metadata.get_metadata_key_ref(key)?;
        Ok(match key.as_alias().and_then(ResourceAlias::page) {
            Some((offset, limit)) => self.metadata.every_ref(&refs, |m| {
                m.loaded
                    || m.offset_page
                        .as_ref()
                        .is_some_and(|pages| pages.is_page_loaded(offset, limit))
            }),
            None => self.metadata.every_ref(&refs, |m| m.loaded),
        })
    }

    pub fn is_outdated(&self, key: &ResourceKey<R::Key>) -> Result<bool, ResourceError> {
        self.metadata.some(key, |m| m.outdated)
    }

    pub fn is_loading(&self, key: &ResourceKey<R::Key>) -> Result<bool, ResourceError> {
        self.metadata.some(key, |m| m.loading)
    }

    /// The error of the last failed load of any entry `key` addresses.
    pub fn get_exception(
        &self,
        key: &ResourceKey<R::Key>,
    ) -> Result<Option<ResourceError>, ResourceError> {
        let exceptions = self.metadata.map(key, |m| m.exception.clone())?;
        Ok(exceptions.into_iter().flatten().next())
    }

    // --- Internals ---

    /// Fully resolves `key`. A page that was loaded page by page resolves to the
    /// keys its loads committed; any other page is a slice of its resolved parent.
    fn resolve(&self, key: &ResourceKey<R::Key>) -> Result<ResourceKey<R::Key>, ResourceError> {
        if let Some((offset, limit)) = key.as_alias().and_then(ResourceAlias::page) {
            let recorded = self.metadata.map(key, |m| {
                m.offset_page
                    .as_ref()
                    .and_then(|pages| pages.page_keys(offset, limit))
            })?;
            if let Some(keys) = recorded.into_iter().flatten().next() {
                return Ok(ResourceKey::List(keys));
            }
        }
        self.aliases.transform_to_key(key.clone())
    }

    fn is_fresh(&self, key: &ResourceKey<R::Key>) -> Result<bool, ResourceError> {
        Ok(self.is_loaded(key)? && !self.is_outdated(key)?)
    }

    fn validate(&self, key: &ResourceKey<R::Key>) -> Result<(), ResourceError> {
        match key {
            ResourceKey::Flat(key) => self.validate_concrete(key),
            ResourceKey::List(keys) => keys.iter().try_for_each(|key| self.validate_concrete(key)),
            ResourceKey::Alias(alias) | ResourceKey::ListAlias(alias) => {
                if self.aliases.has(alias) {
                    Ok(())
                } else {
                    Err(ResourceError::AliasNotRegistered {
                        alias: alias.to_string(),
                        resource: self.name().to_string(),
                    })
                }
            }
        }
    }

    fn validate_concrete(&self, key: &R::Key) -> Result<(), ResourceError> {
        if self.resource.validate_key(key) {
            Ok(())
        } else {
            Err(ResourceError::InvalidKey(format!("{:?}", key)))
        }
    }

    fn pair(
        &self,
        keys: Vec<R::Key>,
        values: Vec<R::Value>,
    ) -> Result<Vec<(R::Key, R::Value)>, ResourceError> {
        if keys.len() != values.len() {
            return Err(ResourceError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        keys.iter().try_for_each(|key| self.validate_concrete(key))?;
        Ok(keys.into_iter().zip(values).collect())
    }

    fn write_entries(&self, pairs: Vec<(R::Key, R::Value)>) {
        if pairs.is_empty() {
            return;
        }
        let mut written = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = self.metadata.canonical_key(&key);
            self.data.insert(key.clone(), value);
            written.push(key);
        }
        let refs: Vec<_> = written.iter().map(|key| self.metadata.key_ref(key)).collect();
        self.metadata.update_ref(&refs, mark_loaded);
        debug!(resource = self.name(), count = written.len(), "Items updated");

        let updated = match <[R::Key; 1]>::try_from(written) {
            Ok([key]) => ResourceKey::Flat(key),
            Err(keys) => ResourceKey::List(keys),
        };
        self.broadcast(&self.on_item_update, "item_update", updated);
    }

    fn replace_pairs(&self, pairs: Vec<(R::Key, R::Value)>) {
        let stale: Vec<R::Key> = self
            .data
            .keys()
            .into_iter()
            .filter(|existing| {
                !pairs
                    .iter()
                    .any(|(key, _)| self.resource.is_key_equal(existing, key))
            })
            .collect();
        if !stale.is_empty() {
            self.remove_keys(&stale, None);
            self.broadcast(&self.on_item_delete, "item_delete", ResourceKey::List(stale));
        }
        let order: Vec<R::Key> = pairs.iter().map(|(key, _)| key.clone()).collect();
        self.write_entries(pairs);
        self.data.reorder(&order);
    }

    fn delete_from(
        &self,
        key: &ResourceKey<R::Key>,
        origin: Option<&Flight<R::Key>>,
    ) -> Result<(), ResourceError> {
        let resolved = self.resolve(key)?;
        let keys: Vec<R::Key> = resolved
            .concrete_keys()
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect();

        if key.is_alias() {
            let alias_refs = self.metadata.get_metadata_key_ref(key)?;
            self.record_deleted(&alias_refs, origin);
            self.metadata.delete_ref(&alias_refs);
        }
        self.remove_keys(&keys, origin);
        info!(resource = self.name(), %key, count = keys.len(), "Deleted");
        self.broadcast(&self.on_item_delete, "item_delete", resolved);
        Ok(())
    }

    fn remove_keys(&self, keys: &[R::Key], origin: Option<&Flight<R::Key>>) {
        let refs: Vec<_> = keys.iter().map(|key| self.metadata.key_ref(key)).collect();
        for key in keys {
            self.data.remove(key);
        }
        self.record_deleted(&refs, origin);
        self.metadata.delete_ref(&refs);
    }

    // Tells running flights (other than `origin`) not to write these keys back.
    fn record_deleted(&self, refs: &[MetadataKeyRef<R::Key>], origin: Option<&Flight<R::Key>>) {
        if refs.is_empty() {
            return;
        }
        for flight in self.in_flight.lock().iter() {
            if origin.is_some_and(|origin| std::ptr::eq(Arc::as_ptr(flight), origin)) {
                continue;
            }
            flight.deleted.lock().extend(refs.iter().cloned());
        }
    }

    fn record_written<'k>(
        &self,
        flight: &Flight<R::Key>,
        keys: impl IntoIterator<Item = &'k R::Key>,
    ) {
        let mut written = flight.written.lock();
        for key in keys {
            if !written.iter().any(|seen| self.resource.is_key_equal(seen, key)) {
                written.push(key.clone());
            }
        }
    }

    fn is_deleted(&self, flight: &Flight<R::Key>, key: &R::Key) -> bool {
        let key_ref = MetadataKeyRef::Key(key.clone());
        flight
            .deleted
            .lock()
            .iter()
            .any(|deleted| self.same_ref(deleted, &key_ref))
    }

    fn live_refs(
        &self,
        flight: &Flight<R::Key>,
        refs: &[MetadataKeyRef<R::Key>],
    ) -> Vec<MetadataKeyRef<R::Key>> {
        let deleted = flight.deleted.lock();
        refs.iter()
            .filter(|key_ref| !deleted.iter().any(|gone| self.same_ref(gone, key_ref)))
            .cloned()
            .collect()
    }

    fn remove_flight(&self, flight: &Arc<Flight<R::Key>>) {
        self.in_flight
            .lock()
            .retain(|running| !Arc::ptr_eq(running, flight));
    }

    fn overlaps(&self, a: &[MetadataKeyRef<R::Key>], b: &[MetadataKeyRef<R::Key>]) -> bool {
        a.iter().any(|left| b.iter().any(|right| self.same_ref(left, right)))
    }

    /// `true` if `leader` was loading everything `key` addresses. Pages of one list
    /// share its metadata, so they must also be the same page.
    fn answers(
        &self,
        leader: &Flight<R::Key>,
        key: &ResourceKey<R::Key>,
        refs: &[MetadataKeyRef<R::Key>],
    ) -> bool {
        let page = |key: &ResourceKey<R::Key>| key.as_alias().and_then(ResourceAlias::page);
        page(&leader.key) == page(key)
            && refs
                .iter()
                .all(|key_ref| leader.refs.iter().any(|known| self.same_ref(known, key_ref)))
    }

    fn same_ref(&self, a: &MetadataKeyRef<R::Key>, b: &MetadataKeyRef<R::Key>) -> bool {
        match (a, b) {
            (MetadataKeyRef::Alias(a), MetadataKeyRef::Alias(b)) => a == b,
            (MetadataKeyRef::Key(a), MetadataKeyRef::Key(b)) => self.resource.is_key_equal(a, b),
            _ => false,
        }
    }

    fn broadcast<T: 'static>(&self, executor: &SyncExecutor<T>, event: &'static str, data: T) {
        if let Err(error) = executor.execute(data) {
            warn!(resource = self.name(), event, error = %error, "Lifecycle handler failed");
        }
    }
}

fn mark_loaded<K, E>(metadata: &mut CachedResourceMetadata<K, E>) {
    metadata.loaded = true;
    metadata.outdated = false;
    metadata.exception = None;
    metadata.loading = false;
}

fn resolve_page_parent<K>(alias: &ResourceAlias) -> ResourceKey<K> {
    match alias.parent() {
        Some(parent) => ResourceKey::ListAlias(parent.clone()),
        None => ResourceKey::List(Vec::new()),
    }
}

fn slice_page<K>(alias: &ResourceAlias, key: ResourceKey<K>) -> ResourceKey<K> {
    match (key, alias.page()) {
        (ResourceKey::List(keys), Some((offset, limit))) => {
            ResourceKey::List(keys.into_iter().skip(offset).take(limit).collect())
        }
        (other, _) => other,
    }
}
