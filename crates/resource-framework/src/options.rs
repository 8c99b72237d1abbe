//! # Resource Options
//!
//! Tunables shared by every resource. Options are plain data so applications can
//! deserialize them from their own configuration source.

use serde::{Deserialize, Serialize};

/// Maximum number of hops followed while resolving an alias chain.
pub const MAX_ALIAS_DEPTH: usize = 10;

/// Capacity of the metadata change channel.
pub const DEFAULT_CHANGE_BUFFER: usize = 64;

/// Per-resource configuration.
///
/// # Example
///
/// ```rust
/// use resource_framework::ResourceOptions;
///
/// let options = ResourceOptions::default().with_change_buffer(16);
/// assert_eq!(options.max_alias_depth, 10);
/// assert_eq!(options.change_buffer, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceOptions {
    /// Alias resolution gives up (and logs) after this many hops.
    pub max_alias_depth: usize,
    /// Buffered metadata change notifications per subscriber.
    pub change_buffer: usize,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            max_alias_depth: MAX_ALIAS_DEPTH,
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

impl ResourceOptions {
    pub fn with_max_alias_depth(mut self, depth: usize) -> Self {
        self.max_alias_depth = depth;
        self
    }

    /// Zero is bumped to one; the change channel needs room for a message.
    pub fn with_change_buffer(mut self, capacity: usize) -> Self {
        self.change_buffer = capacity.max(1);
        self
    }
}
