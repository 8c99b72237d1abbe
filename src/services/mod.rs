//! Collaborators that own the user data.
//!
//! The cache never talks to storage directly: [`UsersResource`](crate::resources::UsersResource)
//! calls a [`UserService`] from its loader, and the form pipeline persists through it.
//! [`InMemoryUserService`] is the in-process implementation used by the demo and tests.

pub mod error;
pub mod user_service;

pub use error::*;
pub use user_service::*;
