//! # Resource Metadata
//!
//! [`ResourceMetadata`] is a per-key state store that lives next to (not inside) the
//! cached values. It is generic over the entry type so any keyed resource can reuse
//! it; [`CachedResourceMetadata`] is the entry used by
//! [`CachedMapResource`](crate::CachedMapResource).
//!
//! ## Key normalization
//!
//! Every key is normalized to a [`MetadataKeyRef`] before lookup:
//!
//! - **Alias**: transformed one level through the resource's aliases, offset page
//!   sub-aliases stripped to their parent, then keyed by its string form.
//! - **Concrete key**: the first stored key that is equal under the resource's
//!   key-equality function, or the key itself.
//!
//! Lookup is a linear scan. Resource key sets are small, and object keys compared
//! by a custom equality cannot be hashed consistently anyway.
//!
//! ## Change notification
//!
//! Mutations emit a [`MetadataChange`] on a broadcast channel. Call
//! [`ResourceMetadata::subscribe`] to observe them.

use crate::alias::ResourceAliases;
use crate::error::ResourceError;
use crate::key::{ResourceAlias, ResourceKey};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Key equality used to canonicalize concrete keys.
pub type KeyEquality<K> = Arc<dyn Fn(&K, &K) -> bool + Send + Sync>;

/// Rewrites an alias before it is used as a metadata key.
pub type AliasNormalizer = Arc<dyn Fn(ResourceAlias) -> ResourceAlias + Send + Sync>;

/// Normalized metadata key.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataKeyRef<K> {
    Alias(String),
    Key(K),
}

/// A change emitted by a metadata mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataChange<K> {
    Updated(MetadataKeyRef<K>),
    Deleted(MetadataKeyRef<K>),
}

/// Loaded pages of an offset-paginated list alias.
///
/// Besides the loaded ranges, every committed key is kept at its list position,
/// so a page resolves to the keys its load returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPagination<K> {
    pages: Vec<Range<usize>>,
    positions: Vec<Option<K>>,
    end: Option<usize>,
}

impl<K> Default for OffsetPagination<K> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            positions: Vec::new(),
            end: None,
        }
    }
}

impl<K: Clone> OffsetPagination<K> {
    /// Index one past the last item, once a short page has been seen.
    pub fn end(&self) -> Option<usize> {
        self.end
    }

    pub fn pages(&self) -> &[Range<usize>] {
        &self.pages
    }

    /// `true` if `offset..offset + limit` is covered or lies past the known end.
    pub fn is_page_loaded(&self, offset: usize, limit: usize) -> bool {
        let mut wanted_end = offset.saturating_add(limit);
        if let Some(end) = self.end {
            if offset >= end {
                return true;
            }
            wanted_end = wanted_end.min(end);
        }
        if wanted_end <= offset {
            return true;
        }
        self.pages
            .iter()
            .any(|page| page.start <= offset && page.end >= wanted_end)
    }

    /// Keys recorded for `offset..offset + limit`, in list order. `None` unless
    /// that range was loaded page by page.
    pub fn page_keys(&self, offset: usize, limit: usize) -> Option<Vec<K>> {
        if self.pages.is_empty() && self.end.is_none() {
            return None;
        }
        if !self.is_page_loaded(offset, limit) {
            return None;
        }
        let stop = offset.saturating_add(limit).min(self.positions.len());
        let keys = self
            .positions
            .get(offset..stop)
            .unwrap_or_default()
            .iter()
            .flatten()
            .cloned()
            .collect();
        Some(keys)
    }

    /// Records a loaded page that returned `keys`, in order.
    pub fn commit_page(&mut self, offset: usize, limit: usize, keys: Vec<K>) {
        let count = keys.len();
        if self.positions.len() < offset + count {
            self.positions.resize(offset + count, None);
        }
        for (slot, key) in self.positions[offset..].iter_mut().zip(keys) {
            *slot = Some(key);
        }
        if count > 0 {
            self.insert(offset..offset + count);
        }
        if count < limit {
            self.end = Some(offset + count);
            self.positions.truncate(offset + count);
        } else if self.end.is_some_and(|end| end < offset + count) {
            self.end = None;
        }
    }

    pub fn reset(&mut self) {
        self.pages.clear();
        self.positions.clear();
        self.end = None;
    }

    // Keeps pages sorted and merged.
    fn insert(&mut self, range: Range<usize>) {
        self.pages.push(range);
        self.pages.sort_by_key(|page| page.start);
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(self.pages.len());
        for page in self.pages.drain(..) {
            match merged.last_mut() {
                Some(last) if page.start <= last.end => last.end = last.end.max(page.end),
                _ => merged.push(page),
            }
        }
        self.pages = merged;
    }
}

/// Metadata entry of a cached resource.
#[derive(Debug, Clone)]
pub struct CachedResourceMetadata<K, E = ()> {
    pub loading: bool,
    pub loaded: bool,
    pub outdated: bool,
    pub exception: Option<ResourceError>,
    /// Set on list aliases that were loaded page by page.
    pub offset_page: Option<OffsetPagination<K>>,
    /// Resource-specific state.
    pub extension: E,
}

impl<K, E: Default> Default for CachedResourceMetadata<K, E> {
    fn default() -> Self {
        Self {
            loading: false,
            loaded: false,
            outdated: false,
            exception: None,
            offset_page: None,
            extension: E::default(),
        }
    }
}

/// Observable per-key state store.
pub struct ResourceMetadata<K, M> {
    entries: RwLock<Vec<(MetadataKeyRef<K>, M)>>,
    aliases: Arc<ResourceAliases<K>>,
    is_key_equal: KeyEquality<K>,
    normalize_alias: Option<AliasNormalizer>,
    changes: broadcast::Sender<MetadataChange<K>>,
}

impl<K, M> ResourceMetadata<K, M>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    M: Default + Clone,
{
    pub fn new(
        aliases: Arc<ResourceAliases<K>>,
        is_key_equal: KeyEquality<K>,
        change_buffer: usize,
    ) -> Self {
        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Self {
            entries: RwLock::new(Vec::new()),
            aliases,
            is_key_equal,
            normalize_alias: None,
            changes,
        }
    }

    /// Replaces the default alias normalization (offset pages collapse to their parent).
    pub fn with_alias_normalizer(
        mut self,
        normalizer: impl Fn(ResourceAlias) -> ResourceAlias + Send + Sync + 'static,
    ) -> Self {
        self.normalize_alias = Some(Arc::new(normalizer));
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetadataChange<K>> {
        self.changes.subscribe()
    }

    /// Normalizes `key` into one metadata key per addressed entry.
    pub fn get_metadata_key_ref(
        &self,
        key: &ResourceKey<K>,
    ) -> Result<Vec<MetadataKeyRef<K>>, ResourceError> {
        match key {
            ResourceKey::Flat(key) => Ok(vec![self.key_ref(key)]),
            ResourceKey::List(keys) => Ok(keys.iter().map(|key| self.key_ref(key)).collect()),
            ResourceKey::Alias(alias) | ResourceKey::ListAlias(alias) => {
                Ok(vec![self.alias_ref(alias)?])
            }
        }
    }

    /// Normalized key of an alias.
    pub fn alias_ref(&self, alias: &ResourceAlias) -> Result<MetadataKeyRef<K>, ResourceError> {
        let alias = match &self.normalize_alias {
            Some(normalize) => normalize(alias.clone()),
            None => self
                .aliases
                .strip_parents(alias, ResourceAlias::is_offset_page),
        };
        let alias = self.aliases.transform_to_alias(&alias)?;
        Ok(MetadataKeyRef::Alias(alias.to_string()))
    }

    /// Canonical key of a concrete key.
    pub fn key_ref(&self, key: &K) -> MetadataKeyRef<K> {
        MetadataKeyRef::Key(self.canonical_key(key))
    }

    /// The first stored key equal to `key`, or `key` itself.
    pub fn canonical_key(&self, key: &K) -> K {
        self.entries
            .read()
            .iter()
            .find_map(|(stored, _)| match stored {
                MetadataKeyRef::Key(stored) if (self.is_key_equal)(stored, key) => {
                    Some(stored.clone())
                }
                _ => None,
            })
            .unwrap_or_else(|| key.clone())
    }

    /// Returns the metadata of every addressed entry, creating defaults on first access.
    pub fn get(&self, key: &ResourceKey<K>) -> Result<Vec<M>, ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        Ok(refs.iter().map(|key_ref| self.get_ref(key_ref)).collect())
    }

    pub fn get_ref(&self, key_ref: &MetadataKeyRef<K>) -> M {
        if let Some(existing) = self.find(key_ref) {
            return existing;
        }
        let mut entries = self.entries.write();
        if let Some((_, existing)) = entries.iter().find(|(stored, _)| self.matches(stored, key_ref)) {
            return existing.clone();
        }
        let created = M::default();
        entries.push((key_ref.clone(), created.clone()));
        created
    }

    /// `true` if every addressed entry has metadata.
    pub fn has(&self, key: &ResourceKey<K>) -> Result<bool, ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        Ok(refs.iter().all(|key_ref| self.find(key_ref).is_some()))
    }

    /// `true` if `predicate` holds for every addressed entry (defaults for unseen keys).
    pub fn every(
        &self,
        key: &ResourceKey<K>,
        predicate: impl Fn(&M) -> bool,
    ) -> Result<bool, ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        Ok(self.every_ref(&refs, predicate))
    }

    pub fn every_ref(&self, refs: &[MetadataKeyRef<K>], predicate: impl Fn(&M) -> bool) -> bool {
        refs.iter()
            .all(|key_ref| predicate(&self.find(key_ref).unwrap_or_default()))
    }

    /// `true` if `predicate` holds for at least one addressed entry.
    pub fn some(
        &self,
        key: &ResourceKey<K>,
        predicate: impl Fn(&M) -> bool,
    ) -> Result<bool, ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        Ok(self.some_ref(&refs, predicate))
    }

    pub fn some_ref(&self, refs: &[MetadataKeyRef<K>], predicate: impl Fn(&M) -> bool) -> bool {
        refs.iter()
            .any(|key_ref| predicate(&self.find(key_ref).unwrap_or_default()))
    }

    /// Projects every addressed entry.
    pub fn map<R>(
        &self,
        key: &ResourceKey<K>,
        project: impl Fn(&M) -> R,
    ) -> Result<Vec<R>, ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        Ok(refs
            .iter()
            .map(|key_ref| project(&self.find(key_ref).unwrap_or_default()))
            .collect())
    }

    /// Mutates every addressed entry, creating defaults as needed.
    pub fn update(
        &self,
        key: &ResourceKey<K>,
        mutate: impl FnMut(&mut M),
    ) -> Result<(), ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        self.update_ref(&refs, mutate);
        Ok(())
    }

    pub fn update_ref(&self, refs: &[MetadataKeyRef<K>], mut mutate: impl FnMut(&mut M)) {
        {
            let mut entries = self.entries.write();
            for key_ref in refs {
                match entries.iter_mut().find(|(stored, _)| self.matches(stored, key_ref)) {
                    Some((_, metadata)) => mutate(metadata),
                    None => {
                        let mut metadata = M::default();
                        mutate(&mut metadata);
                        entries.push((key_ref.clone(), metadata));
                    }
                }
            }
        }
        for key_ref in refs {
            let _ = self.changes.send(MetadataChange::Updated(key_ref.clone()));
        }
    }

    /// Removes every addressed entry.
    pub fn delete(&self, key: &ResourceKey<K>) -> Result<(), ResourceError> {
        let refs = self.get_metadata_key_ref(key)?;
        self.delete_ref(&refs);
        Ok(())
    }

    pub fn delete_ref(&self, refs: &[MetadataKeyRef<K>]) {
        let mut removed = Vec::new();
        {
            let mut entries = self.entries.write();
            for key_ref in refs {
                if let Some(index) = entries.iter().position(|(stored, _)| self.matches(stored, key_ref)) {
                    removed.push(entries.remove(index).0);
                }
            }
        }
        for key_ref in removed {
            let _ = self.changes.send(MetadataChange::Deleted(key_ref));
        }
    }

    /// Every stored metadata key.
    pub fn keys(&self) -> Vec<MetadataKeyRef<K>> {
        self.entries.read().iter().map(|(key_ref, _)| key_ref.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        let removed: Vec<MetadataKeyRef<K>> = self
            .entries
            .write()
            .drain(..)
            .map(|(key_ref, _)| key_ref)
            .collect();
        for key_ref in removed {
            let _ = self.changes.send(MetadataChange::Deleted(key_ref));
        }
    }

    fn find(&self, key_ref: &MetadataKeyRef<K>) -> Option<M> {
        self.entries
            .read()
            .iter()
            .find(|(stored, _)| self.matches(stored, key_ref))
            .map(|(_, metadata)| metadata.clone())
    }

    fn matches(&self, stored: &MetadataKeyRef<K>, key_ref: &MetadataKeyRef<K>) -> bool {
        match (stored, key_ref) {
            (MetadataKeyRef::Alias(a), MetadataKeyRef::Alias(b)) => a == b,
            (MetadataKeyRef::Key(a), MetadataKeyRef::Key(b)) => (self.is_key_equal)(a, b),
            _ => false,
        }
    }
}
