//! Form submission built on linked [`SyncExecutor`](resource_framework::SyncExecutor)s.

pub mod pipeline;

pub use pipeline::*;
