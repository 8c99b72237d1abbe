use super::SystemConfig;
use crate::forms::FormPipeline;
use crate::model::UserId;
use crate::resources::UsersResource;
use crate::services::UserService;
use resource_framework::{CachedMapResource, MetadataChange};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The application orchestrator.
///
/// `ResourceSystem` is responsible for:
/// - **Dependency Wiring**: service → [`UsersResource`] cache → [`FormPipeline`]
/// - **Configuration**: applying [`SystemConfig`] to the cache
/// - **Background tasks**: the optional metadata change log, stopped by [`shutdown`](Self::shutdown)
///
/// # Example
///
/// ```ignore
/// let service = Arc::new(InMemoryUserService::seeded());
/// let system = ResourceSystem::new(service, &SystemConfig::default());
///
/// let alice = system.users.load_one(UserId(1)).await?;
/// let outcome = system.forms.submit(form).await?;
///
/// system.shutdown().await?;
/// ```
pub struct ResourceSystem {
    /// Cached users
    pub users: Arc<CachedMapResource<UsersResource>>,

    /// Form submission writing through `users`
    pub forms: FormPipeline,

    service: Arc<dyn UserService>,

    /// Background task handles (used for shutdown)
    handles: Vec<JoinHandle<()>>,
}

impl ResourceSystem {
    /// Wires the system around `service`.
    ///
    /// With `log_changes` set this spawns a task, so it must be called inside a
    /// Tokio runtime.
    pub fn new(service: Arc<dyn UserService>, config: &SystemConfig) -> Self {
        let users = Arc::new(CachedMapResource::with_options(
            UsersResource::new(service.clone()),
            config.resource.clone(),
        ));
        let forms = FormPipeline::new(users.clone(), service.clone());

        let mut handles = Vec::new();
        if config.log_changes {
            handles.push(tokio::spawn(log_changes(users.subscribe_metadata())));
        }
        info!(
            max_alias_depth = config.resource.max_alias_depth,
            log_changes = config.log_changes,
            "Resource system started"
        );

        Self {
            users,
            forms,
            service,
            handles,
        }
    }

    pub fn service(&self) -> &Arc<dyn UserService> {
        &self.service
    }

    /// Stops background tasks.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if every task stopped cleanly
    /// - `Err(String)` if a task panicked
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");
        for handle in self.handles {
            handle.abort();
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!("Background task failed: {:?}", e);
                    return Err(format!("Background task failed: {:?}", e));
                }
            }
        }
        info!("System shutdown complete.");
        Ok(())
    }
}

async fn log_changes(mut changes: broadcast::Receiver<MetadataChange<UserId>>) {
    loop {
        match changes.recv().await {
            Ok(change) => debug!(?change, "Metadata changed"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Change log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
