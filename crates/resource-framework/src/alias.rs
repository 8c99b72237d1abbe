//! # Alias Registry
//!
//! [`ResourceAliases`] maps alias ids to resolver callbacks. Each resource owns one
//! registry; aliases used against a resource that never registered them are
//! programmer errors and fail with [`ResourceError::AliasNotRegistered`].
//!
//! Resolution is depth guarded in both directions: following resolvers down to a
//! concrete key ([`ResourceAliases::transform_to_key`]) and walking `parent` links
//! up ([`ResourceAliases::root_alias`]). Running past the guard is logged and the
//! walk stops where it is.
//!
//! ```rust
//! use resource_framework::{AliasFactory, ResourceAliases, ResourceKey};
//!
//! const FIRST_TWO: AliasFactory = AliasFactory::list("first-two");
//!
//! let aliases = ResourceAliases::<u32>::new("Numbers", 10);
//! aliases.add(&FIRST_TWO, |_| ResourceKey::list([1, 2]));
//!
//! let key = aliases.transform_to_key(FIRST_TWO.key()).unwrap();
//! assert_eq!(key, ResourceKey::list([1, 2]));
//! ```

use crate::error::ResourceError;
use crate::key::{AliasFactory, ResourceAlias, ResourceKey};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, error};

/// Resolves an alias one step further.
pub type AliasResolver<K> = Arc<dyn Fn(&ResourceAlias) -> ResourceKey<K> + Send + Sync>;

/// Post-processes the fully resolved key of an alias frame.
pub type KeyTransform<K> =
    Arc<dyn Fn(&ResourceAlias, ResourceKey<K>) -> ResourceKey<K> + Send + Sync>;

/// Anything that names an alias id.
pub trait AliasId {
    fn alias_id(&self) -> &str;
}

impl AliasId for AliasFactory {
    fn alias_id(&self) -> &str {
        self.id()
    }
}

impl AliasId for ResourceAlias {
    fn alias_id(&self) -> &str {
        self.id()
    }
}

impl AliasId for str {
    fn alias_id(&self) -> &str {
        self
    }
}

struct AliasEntry<K> {
    id: String,
    resolver: AliasResolver<K>,
    transform: Option<KeyTransform<K>>,
}

impl<K> Clone for AliasEntry<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            resolver: self.resolver.clone(),
            transform: self.transform.clone(),
        }
    }
}

/// Per-resource alias registry.
pub struct ResourceAliases<K> {
    resource: String,
    max_depth: usize,
    entries: RwLock<Vec<AliasEntry<K>>>,
    // Threads currently inside a resolver of this registry.
    resolving: Mutex<Vec<ThreadId>>,
}

struct ResolverGuard<'a> {
    resolving: &'a Mutex<Vec<ThreadId>>,
    thread: ThreadId,
}

impl Drop for ResolverGuard<'_> {
    fn drop(&mut self) {
        let mut resolving = self.resolving.lock();
        if let Some(index) = resolving.iter().position(|id| *id == self.thread) {
            resolving.swap_remove(index);
        }
    }
}

impl<K> ResourceAliases<K>
where
    K: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    /// Creates an empty registry. `resource` names the owner in error messages.
    pub fn new(resource: impl Into<String>, max_depth: usize) -> Self {
        Self {
            resource: resource.into(),
            max_depth,
            entries: RwLock::new(Vec::new()),
            resolving: Mutex::new(Vec::new()),
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource
    }

    /// Registers a resolver for an alias id.
    pub fn add<A, F>(&self, alias: &A, resolver: F)
    where
        A: AliasId + ?Sized,
        F: Fn(&ResourceAlias) -> ResourceKey<K> + Send + Sync + 'static,
    {
        self.push(alias.alias_id(), Arc::new(resolver), None);
    }

    /// Registers a resolver plus a transform applied to the final resolved key.
    pub fn add_with_transform<A, F, T>(&self, alias: &A, resolver: F, transform: T)
    where
        A: AliasId + ?Sized,
        F: Fn(&ResourceAlias) -> ResourceKey<K> + Send + Sync + 'static,
        T: Fn(&ResourceAlias, ResourceKey<K>) -> ResourceKey<K> + Send + Sync + 'static,
    {
        self.push(alias.alias_id(), Arc::new(resolver), Some(Arc::new(transform)));
    }

    fn push(&self, id: &str, resolver: AliasResolver<K>, transform: Option<KeyTransform<K>>) {
        debug!(resource = %self.resource, alias = id, "Alias registered");
        self.entries.write().push(AliasEntry {
            id: id.to_string(),
            resolver,
            transform,
        });
    }

    /// Returns `true` if a resolver is registered for the alias id.
    pub fn has<A: AliasId + ?Sized>(&self, alias: &A) -> bool {
        self.entry(alias.alias_id()).is_some()
    }

    /// Returns the (one level transformed) alias if `key` is an alias, optionally
    /// only if it matches `compare`.
    pub fn is_alias(
        &self,
        key: &ResourceKey<K>,
        compare: Option<&AliasFactory>,
    ) -> Result<Option<ResourceAlias>, ResourceError> {
        let Some(alias) = key.as_alias() else {
            return Ok(None);
        };
        let alias = self.transform_to_alias(alias)?;
        match compare {
            Some(factory) if !alias.is(factory) => Ok(None),
            _ => Ok(Some(alias)),
        }
    }

    /// Resolves exactly one level: if the resolver yields another alias, that alias
    /// is returned; otherwise the input is.
    ///
    /// While a resolver of this registry runs on the current thread, nested calls
    /// return their input untouched.
    pub fn transform_to_alias(&self, alias: &ResourceAlias) -> Result<ResourceAlias, ResourceError> {
        if self.is_resolving() {
            return Ok(alias.clone());
        }
        let entry = self.require(alias)?;
        match self.resolve(&entry, alias) {
            ResourceKey::Alias(next) | ResourceKey::ListAlias(next) if next != *alias => Ok(next),
            _ => Ok(alias.clone()),
        }
    }

    /// Fully resolves `key` to a flat key or key list.
    ///
    /// Alias frames with a transform are replayed once a concrete key is reached:
    /// the frame nearest to the concrete key first, the alias passed in last.
    pub fn transform_to_key(&self, key: ResourceKey<K>) -> Result<ResourceKey<K>, ResourceError> {
        let mut frames: Vec<(ResourceAlias, KeyTransform<K>)> = Vec::new();
        let mut current = key;
        let mut depth = 0;

        while let Some(alias) = current.as_alias().cloned() {
            if depth >= self.max_depth {
                error!(
                    resource = %self.resource,
                    %alias,
                    depth,
                    "Alias resolution exceeded max depth"
                );
                break;
            }
            let entry = self.require(&alias)?;
            let next = self.resolve(&entry, &alias);
            if let Some(transform) = entry.transform {
                frames.push((alias.clone(), transform));
            }
            if next == current {
                error!(resource = %self.resource, %alias, "Alias resolves to itself");
                break;
            }
            current = next;
            depth += 1;
        }

        if let Some(alias) = current.as_alias() {
            return Err(ResourceError::AliasNotResolved(alias.to_string()));
        }

        for (alias, transform) in frames.into_iter().rev() {
            current = transform(&alias, current);
        }
        Ok(current)
    }

    /// Walks `parent` links up to the topmost alias.
    pub fn root_alias(&self, alias: &ResourceAlias) -> ResourceAlias {
        self.strip_parents(alias, |_| true)
    }

    /// Walks `parent` links up while `strip` accepts the current alias.
    pub fn strip_parents(
        &self,
        alias: &ResourceAlias,
        strip: impl Fn(&ResourceAlias) -> bool,
    ) -> ResourceAlias {
        let mut current = alias;
        let mut depth = 0;
        while let Some(parent) = current.parent() {
            if !strip(current) {
                break;
            }
            if depth >= self.max_depth {
                error!(resource = %self.resource, %alias, depth, "Alias parent chain exceeded max depth");
                break;
            }
            current = parent;
            depth += 1;
        }
        current.clone()
    }

    fn entry(&self, id: &str) -> Option<AliasEntry<K>> {
        self.entries.read().iter().find(|entry| entry.id == id).cloned()
    }

    fn require(&self, alias: &ResourceAlias) -> Result<AliasEntry<K>, ResourceError> {
        self.entry(alias.id())
            .ok_or_else(|| ResourceError::AliasNotRegistered {
                alias: alias.to_string(),
                resource: self.resource.clone(),
            })
    }

    fn resolve(&self, entry: &AliasEntry<K>, alias: &ResourceAlias) -> ResourceKey<K> {
        let thread = thread::current().id();
        self.resolving.lock().push(thread);
        let _guard = ResolverGuard {
            resolving: &self.resolving,
            thread,
        };
        (entry.resolver)(alias)
    }

    fn is_resolving(&self) -> bool {
        let thread = thread::current().id();
        self.resolving.lock().contains(&thread)
    }
}
