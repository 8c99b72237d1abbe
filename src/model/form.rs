use super::{ProjectId, User, UserId};
use serde::{Deserialize, Serialize};

/// Raw user input, as typed into a form.
///
/// Submitting a form creates the user `id` or replaces it if it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserForm {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub project: ProjectId,
}

impl UserForm {
    pub fn new(id: u64, name: impl Into<String>, email: impl Into<String>, project: u64) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
            email: email.into(),
            project: ProjectId(project),
        }
    }

    /// The same form with surrounding whitespace removed and the email lowercased.
    pub fn normalized(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            project: self.project,
        }
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            project: self.project,
        }
    }
}
