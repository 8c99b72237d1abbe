use resource_framework::ResourceKey;
use resource_recipe::lifecycle::{init_tracing, ResourceSystem, SystemConfig};
use resource_recipe::model::{ProjectId, UserForm, UserId};
use resource_recipe::resources::{all_users, project_users};
use resource_recipe::services::InMemoryUserService;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = SystemConfig::from_env().map_err(|e| e.to_string())?;
    init_tracing(&config);

    info!("Starting application with users resource");
    let service = Arc::new(InMemoryUserService::seeded());
    let system = ResourceSystem::new(service.clone(), &config);

    // Single key: the second load is served from the cache
    let span = tracing::info_span!("single_load");
    async {
        let alice = system.users.load_one(UserId(1)).await.map_err(|e| e.to_string())?;
        info!(?alice, "Loaded user");
        system.users.load_one(UserId(1)).await.map_err(|e| e.to_string())?;
        info!(service_calls = service.calls(), "Second load served from cache");
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    // Aliases
    let span = tracing::info_span!("alias_load");
    async {
        let first_page = ResourceKey::offset_page(&all_users(), 0, 2)
            .ok_or_else(|| "all_users() is not a list alias".to_string())?;
        let page = system.users.load(first_page).await.map_err(|e| e.to_string())?;
        info!(size = page.len(), "Loaded first page of users");

        let team = system
            .users
            .load(project_users(ProjectId(2)))
            .await
            .map_err(|e| e.to_string())?;
        info!(members = team.iter().flatten().count(), "Loaded project 2");

        let everyone = system.users.load(all_users()).await.map_err(|e| e.to_string())?;
        info!(size = everyone.len(), "Loaded all users");
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    // A failing load records the error against the key
    let missing = UserId(404);
    if let Err(e) = system.users.load_one(missing).await {
        warn!(error = %e, "Load failed as expected");
    }
    let recorded = system
        .users
        .get_exception(&ResourceKey::flat(missing))
        .map_err(|e| e.to_string())?;
    info!(?recorded, "Recorded exception");

    // Form submission
    let span = tracing::info_span!("form_submission");
    async {
        let rejected = system
            .forms
            .submit(UserForm::new(5, "", "not-an-email", 1))
            .await;
        info!(?rejected, "Invalid form");

        match system
            .forms
            .submit(UserForm::new(5, "  Erin ", "Erin@Example.com", 2))
            .await
        {
            Ok(outcome) => info!(?outcome, "Form processed"),
            Err(e) => error!(error = %e, "Form submission failed"),
        }
        info!(attempts = system.forms.attempts().len(), "Form attempts recorded");
    }
    .instrument(span)
    .await;

    system.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}
