//! # MapResource Trait
//!
//! The `MapResource` trait is the contract a concrete resource implements to be cached by
//! [`CachedMapResource`]. The cache owns storage, metadata, alias resolution, in-flight
//! deduplication and lifecycle events; the resource only knows how to fetch data.
//!
//! # Associated Types
//! - `Key`: concrete keys. No `Hash` bound: keys are compared through
//!   [`MapResource::is_key_equal`], so plain objects whose identity is a subset of their
//!   fields work as keys.
//! - `Value`: cached values, cloned out on reads.
//! - `Error`: the loader's error. It is wrapped into [`ResourceError::Loader`] and can be
//!   recovered with [`ResourceError::downcast_ref`].
//! - `Extension`: extra per-key metadata the resource wants to track, stored in
//!   [`CachedResourceMetadata::extension`](crate::CachedResourceMetadata).
//!
//! # Provided Methods
//! - [`MapResource::name`]: used in logs and error messages.
//! - [`MapResource::register_aliases`]: resource-specific aliases.
//! - [`MapResource::validate_key`]: rejects keys outside the resource's domain.
//! - [`MapResource::is_key_equal`]: key identity, `==` by default.
//!
//! [`CachedMapResource`]: crate::CachedMapResource
//! [`ResourceError::Loader`]: crate::ResourceError::Loader
//! [`ResourceError::downcast_ref`]: crate::ResourceError::downcast_ref

use crate::alias::ResourceAliases;
use crate::cached_map::{DataMap, LoadContext};
use crate::key::ResourceKey;
use async_trait::async_trait;
use std::fmt::Debug;

/// A keyed data source that [`CachedMapResource`](crate::CachedMapResource) can cache.
///
/// ```rust
/// use async_trait::async_trait;
/// use resource_framework::{CachedMapResource, LoadContext, MapResource, ResourceKey};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("no such square")]
/// struct SquareError;
///
/// struct Squares;
///
/// #[async_trait]
/// impl MapResource for Squares {
///     type Key = u32;
///     type Value = u64;
///     type Error = SquareError;
///     type Extension = ();
///
///     async fn loader(
///         &self,
///         key: &ResourceKey<u32>,
///         ctx: &LoadContext<'_, Self>,
///     ) -> Result<(), SquareError> {
///         let ResourceKey::Flat(n) = key else { return Err(SquareError) };
///         ctx.set(*n, u64::from(*n) * u64::from(*n)).map_err(|_| SquareError)
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let squares = CachedMapResource::new(Squares);
///     assert_eq!(squares.load_one(12).await.unwrap(), Some(144));
///     assert!(squares.is_loaded(&ResourceKey::flat(12)).unwrap());
/// }
/// ```
#[async_trait]
pub trait MapResource: Send + Sync + Sized + 'static {
    type Key: Clone + PartialEq + Debug + Send + Sync + 'static;
    type Value: Clone + Debug + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;
    type Extension: Default + Clone + Debug + Send + Sync + 'static;

    /// Short name of the resource, e.g. `UsersResource`.
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        let without_generics = full.split('<').next().unwrap_or(full);
        without_generics.rsplit("::").next().unwrap_or("Resource")
    }

    /// Registers resource-specific aliases. `data` is a read handle on the cached
    /// entries for resolvers that derive keys from what is already loaded.
    fn register_aliases(
        &self,
        _aliases: &ResourceAliases<Self::Key>,
        _data: &DataMap<Self::Key, Self::Value>,
    ) {
    }

    /// Returns `false` for keys that do not belong to this resource.
    fn validate_key(&self, _key: &Self::Key) -> bool {
        true
    }

    fn is_key_equal(&self, a: &Self::Key, b: &Self::Key) -> bool {
        a == b
    }

    /// Fetches the data for `key` and commits it through `ctx`.
    ///
    /// `key` may be a flat key, a key list or an alias. Aliases can be resolved
    /// with [`LoadContext::resolve`]. Returning `Err` records the error against
    /// every key the load covered.
    async fn loader(
        &self,
        key: &ResourceKey<Self::Key>,
        ctx: &LoadContext<'_, Self>,
    ) -> Result<(), Self::Error>;
}
