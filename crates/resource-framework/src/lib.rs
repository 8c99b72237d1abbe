//! # Resource Framework
//!
//! This crate provides a generic, keyed resource cache together with the synchronous
//! executor pipeline the cache uses to broadcast lifecycle events. Applications reuse the
//! same pipeline to build ordered, interruptible multi-stage operations such as
//! validate → format → submit.
//!
//! ## Architecture Overview
//!
//! The framework is layered leaf to root:
//!
//! 1. **Key model** ([`ResourceKey`]) - flat keys, key lists, aliases and list-aliases
//! 2. **Alias registry** ([`ResourceAliases`]) - resolves aliases to concrete keys, depth guarded
//! 3. **Metadata store** ([`ResourceMetadata`]) - per-key `loading` / `loaded` / `outdated` / `exception`
//! 4. **Cache** ([`CachedMapResource`]) - values, metadata, aliases, in-flight dedup and lifecycle executors
//! 5. **Executors** ([`SyncExecutor`]) - ordered handlers, post-handlers and chain links
//!
//! You write a [`MapResource`] (what a key means and how to fetch it); the cache handles
//! everything else.
//!
//! ## Core Abstractions
//!
//! ### [`MapResource`] - The Data Source
//!
//! ```rust
//! use async_trait::async_trait;
//! use resource_framework::{
//!     AliasFactory, CachedMapResource, DataMap, LoadContext, MapResource, ResourceAliases,
//!     ResourceKey,
//! };
//!
//! const EVEN: AliasFactory = AliasFactory::list("even");
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("negative keys are not served")]
//! struct NumbersError;
//!
//! struct Numbers;
//!
//! #[async_trait]
//! impl MapResource for Numbers {
//!     type Key = i64;
//!     type Value = String;
//!     type Error = NumbersError;
//!     type Extension = ();
//!
//!     fn register_aliases(&self, aliases: &ResourceAliases<i64>, _data: &DataMap<i64, String>) {
//!         aliases.add(&EVEN, |_| ResourceKey::list([0, 2, 4]));
//!     }
//!
//!     async fn loader(&self, key: &ResourceKey<i64>, ctx: &LoadContext<'_, Self>) -> Result<(), NumbersError> {
//!         let resolved = ctx.resolve(key).map_err(|_| NumbersError)?;
//!         for n in resolved.concrete_keys().unwrap_or_default() {
//!             if *n < 0 {
//!                 return Err(NumbersError);
//!             }
//!             ctx.set(*n, format!("#{n}")).map_err(|_| NumbersError)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let numbers = CachedMapResource::new(Numbers);
//!
//!     let even = numbers.load(EVEN.key()).await.unwrap();
//!     assert_eq!(even, vec![Some("#0".into()), Some("#2".into()), Some("#4".into())]);
//!     assert!(numbers.is_loaded(&ResourceKey::flat(2)).unwrap());
//!
//!     assert!(numbers.load_one(-1).await.is_err());
//!     assert!(numbers.get_exception(&ResourceKey::flat(-1)).unwrap().is_some());
//! }
//! ```
//!
//! ### [`SyncExecutor`] - The Pipeline
//!
//! ```rust
//! use resource_framework::{ExecutorInterrupter, SyncExecutor};
//!
//! let validate = SyncExecutor::<String>::new();
//! let submit = SyncExecutor::<String>::new();
//! validate.add_handler(|name, ctx| {
//!     if name.is_empty() {
//!         ExecutorInterrupter::interrupt(ctx);
//!     }
//!     Ok(())
//! });
//! submit.before(&validate);
//! submit.add_handler(|name, _| {
//!     println!("submitting {name}");
//!     Ok(())
//! });
//!
//! let ctx = submit.execute(String::new()).unwrap();
//! assert!(ExecutorInterrupter::is_interrupted(&ctx));
//! ```
//!
//! ## Concurrency Model
//!
//! - All cache methods take `&self`; share a cache behind an `Arc`
//! - Synchronous state sits behind `parking_lot` locks that are never held across `.await`
//! - At most one loader runs per key; overlapping loads wait on a `tokio::sync::watch`
//! - Metadata changes are published on a `tokio::sync::broadcast` channel
//!
//! ## Testing
//!
//! The [`mock`] module provides [`MockResource`](mock::MockResource), a scripted
//! [`MapResource`] with expectations, call counting and a gate for holding loads in
//! flight.

pub mod alias;
pub mod cached_map;
pub mod error;
pub mod executor;
pub mod key;
pub mod metadata;
pub mod mock;
pub mod options;
pub mod resource;
pub mod tracing;

// Re-export core types for convenience
pub use alias::{AliasId, AliasResolver, KeyTransform, ResourceAliases};
pub use cached_map::{CachedMapResource, DataError, DataMap, LoadContext, ALL_KEYS};
pub use error::{ExecutorError, ResourceError, SharedError};
pub use executor::{
    ContextCreator, ExecutionContext, ExecutorHandlersCollection, ExecutorInterrupter, Handler,
    HandlerId, HandlerResult, InterruptState, LinkFilter, LinkPosition, SyncExecutor,
};
pub use key::{AliasFactory, AliasOptions, KeyKind, ResourceAlias, ResourceKey, OFFSET_PAGE_ALIAS_ID};
pub use metadata::{
    CachedResourceMetadata, KeyEquality, MetadataChange, MetadataKeyRef, OffsetPagination,
    ResourceMetadata,
};
pub use options::{ResourceOptions, DEFAULT_CHANGE_BUFFER, MAX_ALIAS_DEPTH};
pub use resource::MapResource;
