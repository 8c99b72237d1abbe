//! Runtime orchestration and lifecycle management.
//!
//! - [`ResourceSystem`] - wires the service, the users cache and the form pipeline
//! - [`SystemConfig`] - settings from defaults or environment variables
//! - [`init_tracing`] / [`setup_tracing`] - logging setup

pub mod config;
pub mod system;
pub mod tracing;

pub use config::*;
pub use system::*;
pub use self::tracing::*;
