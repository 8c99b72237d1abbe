//! Resources cached by the application.

pub mod users;

pub use users::*;
