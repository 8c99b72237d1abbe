//! Pure data structures (DTOs) cached by [`UsersResource`](crate::resources::UsersResource)
//! and submitted through the [`FormPipeline`](crate::forms::FormPipeline).

pub mod form;
pub mod user;

pub use form::*;
pub use user::*;
