use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a [`User`]. Valid ids are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user_{}", self.0)
    }
}

/// Identifier of the project a user belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project_{}", self.0)
    }
}

/// Represents a registered user in the system.
///
/// Users are fetched through a [`UserService`](crate::services::UserService) and
/// cached by [`UsersResource`](crate::resources::UsersResource), keyed by [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub project: ProjectId,
}

impl User {
    /// Creates a new User instance.
    ///
    /// # Arguments
    /// * `id` - Unique user id
    /// * `name` - User's display name
    /// * `email` - User's email address
    /// * `project` - Project the user is a member of
    pub fn new(id: u64, name: impl Into<String>, email: impl Into<String>, project: u64) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
            email: email.into(),
            project: ProjectId(project),
        }
    }
}
