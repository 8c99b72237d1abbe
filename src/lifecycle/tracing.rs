//! # Application Logging
//!
//! The framework's [`setup_tracing`] reads its filter from `RUST_LOG`. The
//! application adds one override: when [`SystemConfig::log_filter`] is set
//! (`RESOURCE_LOG`), [`init_tracing`] uses those directives instead.
//!
//! ```bash
//! # Framework state changes, application debug
//! RESOURCE_LOG=resource_framework=info,resource_recipe=debug cargo run
//!
//! # Every metadata change, as logged by the change task
//! RESOURCE_LOG=debug RESOURCE_LOG_CHANGES=true cargo run
//! ```

use super::SystemConfig;
pub use resource_framework::tracing::setup_tracing;
use tracing_subscriber::EnvFilter;

/// Initializes logging for `config`.
///
/// Invalid directives in `log_filter` fall back to `RUST_LOG`. Does nothing once a
/// subscriber is installed.
pub fn init_tracing(config: &SystemConfig) {
    let Some(filter) = config.log_filter.as_deref() else {
        setup_tracing();
        return;
    };
    match EnvFilter::try_new(filter) {
        Ok(filter) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .compact()
                .try_init();
        }
        Err(error) => {
            setup_tracing();
            tracing::warn!(error = %error, filter, "Invalid log filter, using RUST_LOG");
        }
    }
}
