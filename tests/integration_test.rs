use async_trait::async_trait;
use resource_framework::{
    CachedMapResource, DataError, LoadContext, MapResource, ResourceKey, ALL_KEYS,
};
use resource_recipe::lifecycle::{ResourceSystem, SystemConfig};
use resource_recipe::model::{ProjectId, User, UserId};
use resource_recipe::resources::{all_users, project_users};
use resource_recipe::services::{InMemoryUserService, UserError, UserService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct TestEntry {
    id: String,
    value: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("Test error")]
struct TestError;

/// Serves `'1'` and `'2'`; loading `'error'` fails.
struct TestMapResource {
    calls: AtomicUsize,
}

#[async_trait]
impl MapResource for TestMapResource {
    type Key = String;
    type Value = TestEntry;
    type Error = TestError;
    type Extension = ();

    fn validate_key(&self, key: &String) -> bool {
        ["1", "2", "error"].contains(&key.as_str())
    }

    async fn loader(
        &self,
        key: &ResourceKey<String>,
        ctx: &LoadContext<'_, Self>,
    ) -> Result<(), TestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let resolved = ctx.resolve(key).map_err(|_| TestError)?;
        for id in resolved.concrete_keys().unwrap_or_default() {
            let value: u32 = id.parse().map_err(|_| TestError)?;
            ctx.set(id.clone(), TestEntry { id: id.clone(), value })
                .map_err(|_| TestError)?;
        }
        Ok(())
    }
}

fn system() -> (Arc<InMemoryUserService>, ResourceSystem) {
    let service = Arc::new(InMemoryUserService::seeded());
    let system = ResourceSystem::new(service.clone(), &SystemConfig::default());
    (service, system)
}

#[tokio::test]
async fn test_map_resource_end_to_end() {
    let cache = CachedMapResource::new(TestMapResource {
        calls: AtomicUsize::new(0),
    });
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();
    cache.on_data_error.add_handler(move |error: &DataError<String>, _| {
        assert_eq!(error.exception.to_string(), "Test error");
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let one = cache.load_one("1".to_string()).await.unwrap();
    assert_eq!(
        one,
        Some(TestEntry {
            id: "1".into(),
            value: 1
        })
    );

    let err = cache.load_one("error".to_string()).await.unwrap_err();
    assert_eq!(err.to_string(), "Test error");
    assert!(err.downcast_ref::<TestError>().is_some());
    assert_eq!(cache.get(&"error".to_string()), None);
    let recorded = cache
        .get_exception(&ResourceKey::flat("error".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(recorded.to_string(), "Test error");
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // Keys outside the resource never reach the loader.
    assert!(cache.load_one("3".to_string()).await.is_err());
    assert_eq!(cache.resource().calls.load(Ordering::SeqCst), 2);

    // `'2'` is loaded, `'1'` is served from the cache.
    let values = cache
        .load(ResourceKey::list(["1".to_string(), "2".to_string()]))
        .await
        .unwrap();
    assert_eq!(values.iter().flatten().map(|e| e.value).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(cache.load(ALL_KEYS.key()).await.unwrap().len(), 2);
}

/// Full end-to-end test of the wired system.
#[tokio::test]
async fn test_users_system_integration() {
    let (service, system) = system();

    let alice = system
        .users
        .load_one(UserId(1))
        .await
        .expect("Failed to load user")
        .expect("User not found");
    assert_eq!(alice.name, "Alice");
    system.users.load_one(UserId(1)).await.unwrap();
    assert_eq!(service.calls(), 1, "Second load should hit the cache");

    let team: Vec<User> = system
        .users
        .load(project_users(ProjectId(1)))
        .await
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(team.iter().map(|u| u.id).collect::<Vec<_>>(), vec![UserId(1), UserId(2)]);

    let everyone = system.users.load(all_users()).await.unwrap();
    assert_eq!(everyone.len(), 4);
    assert!(system.users.is_loaded(&all_users()).unwrap());
    assert!(system.users.is_loaded(&ResourceKey::flat(UserId(4))).unwrap());

    // Alias keys are served from the cache once loaded.
    let calls = service.calls();
    system.users.load(all_users()).await.unwrap();
    system.users.load(project_users(ProjectId(1))).await.unwrap();
    assert_eq!(service.calls(), calls);

    system.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_missing_user_records_error() {
    let (_, system) = system();
    let missing = ResourceKey::flat(UserId(404));

    let err = system.users.load(missing.clone()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<UserError>(),
        Some(UserError::NotFound(UserId(404)))
    ));
    assert!(!system.users.is_loaded(&missing).unwrap());
    assert_eq!(
        system.users.get_exception(&missing).unwrap().map(|e| e.to_string()),
        Some("User not found: user_404".to_string())
    );
}

#[tokio::test]
async fn test_service_outage_then_recovery() {
    let (service, system) = system();
    service.fail_next(UserError::Unavailable("maintenance".into()));

    assert!(system.users.load(all_users()).await.is_err());
    assert!(system.users.get_exception(&all_users()).unwrap().is_some());
    assert!(system.users.is_empty());

    assert_eq!(system.users.load(all_users()).await.unwrap().len(), 4);
    assert!(system.users.get_exception(&all_users()).unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_loads_share_one_service_call() {
    let service = Arc::new(InMemoryUserService::seeded().with_latency(Duration::from_millis(20)));
    let system = ResourceSystem::new(service.clone(), &SystemConfig::default());

    let (a, b, c) = tokio::join!(
        system.users.load_one(UserId(3)),
        system.users.load_one(UserId(3)),
        system.users.load_one(UserId(3)),
    );
    assert_eq!(a.unwrap().map(|u| u.name), Some("Carol".to_string()));
    assert_eq!(b.unwrap(), c.unwrap());
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn test_full_reload_drops_users_removed_upstream() {
    let service = Arc::new(InMemoryUserService::with_users([
        User::new(1, "Alice", "alice@example.com", 1),
    ]));
    let system = ResourceSystem::new(service.clone(), &SystemConfig::default());

    // A user the service no longer knows about.
    system
        .users
        .set(UserId(9), User::new(9, "Ghost", "ghost@example.com", 1))
        .unwrap();
    system.users.load(all_users()).await.unwrap();

    assert_eq!(system.users.keys(), vec![UserId(1)]);
}

#[tokio::test]
async fn test_user_pages() {
    let (service, system) = system();
    let all = all_users();
    let page = |offset| ResourceKey::offset_page(&all, offset, 3).unwrap();

    let first: Vec<_> = system.users.load(page(0)).await.unwrap();
    assert_eq!(first.len(), 3);
    let second = system.users.load(page(3)).await.unwrap();
    assert_eq!(second.into_iter().flatten().map(|u| u.id).collect::<Vec<_>>(), vec![UserId(4)]);
    assert_eq!(service.calls(), 2);

    // The short page ended the list, every later page is known to be loaded.
    assert!(system.users.is_loaded(&page(6)).unwrap());
}

#[tokio::test]
async fn test_mark_outdated_then_reload_picks_up_changes() {
    let (service, system) = system();
    system.users.load_one(UserId(2)).await.unwrap();

    service
        .save_user(User::new(2, "Robert", "bob@example.com", 1))
        .await
        .unwrap();

    // Still the cached value until outdated.
    assert_eq!(system.users.load_one(UserId(2)).await.unwrap().unwrap().name, "Bob");

    system.users.mark_outdated(&ResourceKey::flat(UserId(2))).unwrap();
    assert_eq!(system.users.get(&UserId(2)).unwrap().name, "Bob");
    assert_eq!(system.users.load_one(UserId(2)).await.unwrap().unwrap().name, "Robert");
}

#[tokio::test]
async fn test_change_log_task_stops_on_shutdown() {
    let service = Arc::new(InMemoryUserService::seeded());
    let config = SystemConfig {
        log_changes: true,
        ..SystemConfig::default()
    };
    let system = ResourceSystem::new(service, &config);
    system.users.load_one(UserId(1)).await.unwrap();

    system.shutdown().await.expect("Change log should stop cleanly");
}
