use crate::model::{ProjectId, User, UserId};
use crate::services::UserError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Remote source of users.
#[async_trait]
pub trait UserService: Send + Sync + 'static {
    async fn fetch_user(&self, id: UserId) -> Result<User, UserError>;

    /// Fetches the users in `ids`, in order. Unknown ids are skipped.
    async fn fetch_users(&self, ids: &[UserId]) -> Result<Vec<User>, UserError>;

    async fn fetch_all(&self) -> Result<Vec<User>, UserError>;

    /// A window of [`fetch_all`](Self::fetch_all).
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<User>, UserError>;

    async fn fetch_project(&self, project: ProjectId) -> Result<Vec<User>, UserError>;

    /// Creates the user or replaces the stored user with the same id.
    async fn save_user(&self, user: User) -> Result<(), UserError>;
}

/// In-memory [`UserService`] with call counting and injectable failures.
#[derive(Default)]
pub struct InMemoryUserService {
    users: RwLock<Vec<User>>,
    failures: Mutex<VecDeque<UserError>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A few users spread over two projects.
    pub fn seeded() -> Self {
        Self::with_users([
            User::new(1, "Alice", "alice@example.com", 1),
            User::new(2, "Bob", "bob@example.com", 1),
            User::new(3, "Carol", "carol@example.com", 2),
            User::new(4, "Dave", "dave@example.com", 2),
        ])
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The next call fails with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: UserError) {
        self.failures.lock().push_back(error);
    }

    /// Number of service calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The stored user, without counting a call.
    pub fn stored(&self, id: UserId) -> Option<User> {
        self.users.read().iter().find(|user| user.id == id).cloned()
    }

    async fn begin(&self) -> Result<(), UserError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().pop_front() {
            Some(error) => {
                warn!(error = %error, "Injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    #[instrument(skip(self))]
    async fn fetch_user(&self, id: UserId) -> Result<User, UserError> {
        self.begin().await?;
        debug!("Fetching user");
        self.stored(id).ok_or(UserError::NotFound(id))
    }

    #[instrument(skip(self))]
    async fn fetch_users(&self, ids: &[UserId]) -> Result<Vec<User>, UserError> {
        self.begin().await?;
        let users = self.users.read();
        Ok(ids
            .iter()
            .filter_map(|id| users.iter().find(|user| user.id == *id).cloned())
            .collect())
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<User>, UserError> {
        self.begin().await?;
        Ok(self.users.read().clone())
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<User>, UserError> {
        self.begin().await?;
        Ok(self.users.read().iter().skip(offset).take(limit).cloned().collect())
    }

    #[instrument(skip(self))]
    async fn fetch_project(&self, project: ProjectId) -> Result<Vec<User>, UserError> {
        self.begin().await?;
        Ok(self
            .users
            .read()
            .iter()
            .filter(|user| user.project == project)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, user), fields(id = %user.id))]
    async fn save_user(&self, user: User) -> Result<(), UserError> {
        self.begin().await?;
        let mut users = self.users.write();
        match users.iter_mut().find(|stored| stored.id == user.id) {
            Some(stored) => *stored = user,
            None => users.push(user),
        }
        debug!("User saved");
        Ok(())
    }
}
