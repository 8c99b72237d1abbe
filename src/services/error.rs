//! Error types for user operations.

use crate::model::UserId;
use resource_framework::{ExecutorError, ResourceError};
use thiserror::Error;

/// Errors that can occur during user operations.
#[derive(Debug, Clone, Error)]
pub enum UserError {
    /// The requested user was not found.
    #[error("User not found: {0}")]
    NotFound(UserId),

    /// The user data provided is invalid.
    #[error("User validation error: {0}")]
    ValidationError(String),

    /// The backing service could not serve the request.
    #[error("User service unavailable: {0}")]
    Unavailable(String),

    /// The user cache rejected the operation.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A form pipeline handler failed.
    #[error(transparent)]
    Pipeline(#[from] ExecutorError),
}
