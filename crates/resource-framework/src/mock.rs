//! # Mock Resource & Testing Guide
//!
//! [`MockResource<K, V>`] implements [`MapResource`] from scripted expectations instead of
//! a real data source. Wrap it in a [`CachedMapResource`](crate::CachedMapResource) to test
//! cache behavior, or code built on top of a cache, without any service behind it.
//!
//! ## When to use the Mock vs a Real Resource
//!
//! | Feature | MockResource | Real resource |
//! |---------|--------------|---------------|
//! | **Speed** | Instant (in-memory) | Depends on the service |
//! | **Determinism** | Scripted responses, in order | Subject to the service |
//! | **Error Injection** | Easy (`return_err`) | Hard (requires specific state) |
//! | **Concurrency tests** | `gated()` holds loads in flight | Timing dependent |
//!
//! ## Scripting loads
//!
//! Each loader call consumes the first expectation that accepts the requested key:
//! `expect_load(key)` accepts only `key`, `expect_any_load()` accepts any key. A call
//! no expectation accepts fails with [`MockError::KeyMismatch`] (or
//! [`MockError::Unexpected`] when nothing is scripted) and consumes nothing.
//!
//! ```rust
//! use resource_framework::mock::MockResource;
//! use resource_framework::{CachedMapResource, ResourceKey};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockResource::<String, u32>::new();
//!     mock.expect_load(ResourceKey::flat("a".to_string()))
//!         .return_ok(vec![("a".to_string(), 1)]);
//!     mock.expect_any_load().return_err("service unavailable");
//!
//!     let cache = CachedMapResource::new(mock);
//!     assert_eq!(cache.load_one("a".to_string()).await.unwrap(), Some(1));
//!
//!     let err = cache.load_one("b".to_string()).await.unwrap_err();
//!     assert_eq!(err.to_string(), "service unavailable");
//!
//!     cache.resource().verify();
//! }
//! ```
//!
//! ## Holding loads in flight
//!
//! A gated mock blocks every loader call until [`MockResource::release`] hands out a
//! permit. Use it to start several overlapping loads, check the cache while they are
//! pending, then let them finish.

use crate::cached_map::LoadContext;
use crate::error::ResourceError;
use crate::key::ResourceKey;
use crate::resource::MapResource;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Errors returned by the mock loader.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// Scripted failure; displays as the scripted message.
    #[error("{0}")]
    Failed(String),
    #[error("Unexpected load of {0}")]
    Unexpected(String),
    #[error("Expected load of {expected}, got {actual}")]
    KeyMismatch { expected: String, actual: String },
    #[error("Load gate closed")]
    GateClosed,
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

struct Expectation<K, V> {
    key: Option<ResourceKey<K>>,
    response: Result<Vec<(K, V)>, String>,
}

/// A scripted [`MapResource`].
pub struct MockResource<K, V> {
    expectations: Mutex<VecDeque<Expectation<K, V>>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<ResourceKey<K>>>,
    gate: Option<Semaphore>,
}

impl<K, V> Default for MockResource<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MockResource<K, V> {
    /// Creates a mock with no expectations.
    pub fn new() -> Self {
        Self {
            expectations: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Creates a mock whose loader waits for [`release`](Self::release) before answering.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Expects a load of `key`.
    pub fn expect_load(&self, key: ResourceKey<K>) -> LoadExpectationBuilder<'_, K, V> {
        LoadExpectationBuilder {
            mock: self,
            key: Some(key),
        }
    }

    /// Expects a load of any key.
    pub fn expect_any_load(&self) -> LoadExpectationBuilder<'_, K, V> {
        LoadExpectationBuilder {
            mock: self,
            key: None,
        }
    }

    /// Lets `count` gated loader calls proceed.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Number of loader invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Keys the loader was called with, in call order.
    pub fn requested(&self) -> Vec<ResourceKey<K>>
    where
        K: Clone,
    {
        self.requested.lock().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

/// Builder for load expectations.
pub struct LoadExpectationBuilder<'a, K, V> {
    mock: &'a MockResource<K, V>,
    key: Option<ResourceKey<K>>,
}

impl<K, V> LoadExpectationBuilder<'_, K, V> {
    /// The load commits `entries` with `set` and succeeds.
    pub fn return_ok(self, entries: Vec<(K, V)>) {
        self.push(Ok(entries));
    }

    /// The load fails with `message`.
    pub fn return_err(self, message: impl Into<String>) {
        self.push(Err(message.into()));
    }

    fn push(self, response: Result<Vec<(K, V)>, String>) {
        self.mock.expectations.lock().push_back(Expectation {
            key: self.key,
            response,
        });
    }
}

#[async_trait]
impl<K, V> MapResource for MockResource<K, V>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;
    type Error = MockError;
    type Extension = ();

    async fn loader(&self, key: &ResourceKey<K>, ctx: &LoadContext<'_, Self>) -> Result<(), MockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(key.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| MockError::GateClosed)?.forget();
        }

        let expectation = {
            let mut expectations = self.expectations.lock();
            let position = expectations.iter().position(|expectation| {
                expectation
                    .key
                    .as_ref()
                    .map_or(true, |expected| expected == key)
            });
            match position {
                Some(index) => expectations.remove(index),
                None => {
                    return Err(match expectations.front().and_then(|e| e.key.as_ref()) {
                        Some(expected) => MockError::KeyMismatch {
                            expected: expected.to_string(),
                            actual: key.to_string(),
                        },
                        None => MockError::Unexpected(key.to_string()),
                    });
                }
            }
        };
        let Some(expectation) = expectation else {
            return Err(MockError::Unexpected(key.to_string()));
        };

        for (key, value) in expectation.response.map_err(MockError::Failed)? {
            ctx.set(key, value)?;
        }
        Ok(())
    }
}
