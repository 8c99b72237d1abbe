//! # Observability & Tracing
//!
//! Every cache and executor operation logs through the `tracing` crate with structured
//! fields. The `resource` field names the owning resource, so one filter isolates one
//! cache.
//!
//! ## What Gets Traced
//!
//! - **Resource lifecycle**: creation, `Loaded` with the cache size, `Deleted`, `Cleared`
//! - **Loads**: a `load` span carrying `resource` and `key`; waiting on an in-flight
//!   load, loader start and cancellation at `debug`
//! - **Failures**: failed loads and lifecycle handler errors at `warn`
//! - **Alias misconfiguration**: depth overflow and self-resolving aliases at `error`
//!
//! ## Usage
//!
//! ```bash
//! # State changes only
//! RUST_LOG=info cargo run
//!
//! # Load spans, alias registration and skipped writes
//! RUST_LOG=debug cargo run
//!
//! # Only the framework
//! RUST_LOG=resource_framework=debug cargo run
//! ```
//!
//! With `RUST_LOG=info` a cold load followed by a failing one reads:
//!
//! ```text
//! INFO Resource created resource="UsersResource"
//! INFO load: Loaded resource="UsersResource" key=UserId(1) size=1
//! WARN load: Load failed resource="UsersResource" key=UserId(404) error=User 404 not found
//! ```

/// Initializes compact, `RUST_LOG`-filtered logging.
///
/// Module paths are hidden (`with_target(false)`); the `resource` field identifies the
/// source instead. Calling it again once a subscriber is installed does nothing.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
