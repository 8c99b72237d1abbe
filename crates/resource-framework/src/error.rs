//! # Framework Errors
//!
//! This module defines the error types shared by the cache and executor layers.
//! By centralizing error definitions, every resource reports alias, key and loader
//! failures the same way.
//!
//! Both enums are `Clone`: a single loader failure is handed to every caller
//! waiting on the same in-flight load, stored in the key's metadata and broadcast
//! through `on_data_error`.

use std::error::Error as StdError;
use std::sync::Arc;

/// A type-erased error that can be shared between waiters.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors produced by resources, aliases and metadata lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    #[error("Alias {alias} is not registered in {resource}")]
    AliasNotRegistered { alias: String, resource: String },
    #[error("Alias {0} can't be resolved to a key")]
    AliasNotResolved(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Key list has {keys} keys but {values} values were provided")]
    LengthMismatch { keys: usize, values: usize },
    /// The resource loader failed. Displays as the loader's own message.
    #[error("{0}")]
    Loader(SharedError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl ResourceError {
    /// Wraps a loader error.
    pub fn loader<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        ResourceError::Loader(Arc::new(error))
    }

    /// Returns the loader error as `E` if this is a loader failure of that type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            ResourceError::Loader(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Errors raised while running an executor pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Handler(SharedError),
    #[error("{0}")]
    Message(String),
    #[error("No data passed to executor and no default data set")]
    NoData,
}

impl ExecutorError {
    /// Wraps an arbitrary handler error.
    pub fn handler<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        ExecutorError::Handler(Arc::new(error))
    }

    pub fn message(message: impl Into<String>) -> Self {
        ExecutorError::Message(message.into())
    }
}

impl From<ResourceError> for ExecutorError {
    fn from(error: ResourceError) -> Self {
        match error {
            ResourceError::Executor(inner) => inner,
            other => ExecutorError::Handler(Arc::new(other)),
        }
    }
}
