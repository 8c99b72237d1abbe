use resource_framework::ResourceOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_ALIAS_DEPTH_VAR: &str = "RESOURCE_MAX_ALIAS_DEPTH";
pub const CHANGE_BUFFER_VAR: &str = "RESOURCE_CHANGE_BUFFER";
pub const LOG_FILTER_VAR: &str = "RESOURCE_LOG";
pub const LOG_CHANGES_VAR: &str = "RESOURCE_LOG_CHANGES";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be true or false, got {value:?}")]
    InvalidFlag { var: &'static str, value: String },
}

/// Settings for a [`ResourceSystem`](super::ResourceSystem).
///
/// Built from [`Default`] or from the environment with [`SystemConfig::from_env`]:
///
/// | Variable | Field | Default |
/// |----------|-------|---------|
/// | `RESOURCE_MAX_ALIAS_DEPTH` | `resource.max_alias_depth` | 10 |
/// | `RESOURCE_CHANGE_BUFFER` | `resource.change_buffer` | 64 |
/// | `RESOURCE_LOG` | `log_filter` | unset (`RUST_LOG` applies) |
/// | `RESOURCE_LOG_CHANGES` | `log_changes` | `false` |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub resource: ResourceOptions,
    /// Tracing filter directives; overrides `RUST_LOG` when set.
    pub log_filter: Option<String>,
    /// Spawn a task that logs every user metadata change at `debug`.
    pub log_changes: bool,
}

impl SystemConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(depth) = positive(&lookup, MAX_ALIAS_DEPTH_VAR)? {
            config.resource = config.resource.with_max_alias_depth(depth);
        }
        if let Some(capacity) = positive(&lookup, CHANGE_BUFFER_VAR)? {
            config.resource = config.resource.with_change_buffer(capacity);
        }
        config.log_filter = lookup(LOG_FILTER_VAR).filter(|filter| !filter.trim().is_empty());
        if let Some(value) = lookup(LOG_CHANGES_VAR) {
            config.log_changes = match value.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(ConfigError::InvalidFlag {
                        var: LOG_CHANGES_VAR,
                        value,
                    })
                }
            };
        }
        Ok(config)
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<usize>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(number) if number > 0 => Ok(Some(number)),
        _ => Err(ConfigError::InvalidNumber { var, value }),
    }
}
