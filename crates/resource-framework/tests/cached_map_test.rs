use resource_framework::mock::{MockError, MockResource};
use resource_framework::{
    AliasFactory, CachedMapResource, MetadataChange, MetadataKeyRef, ResourceError, ResourceKey,
    ALL_KEYS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Cache = CachedMapResource<MockResource<String, u32>>;

fn k(value: &str) -> String {
    value.to_string()
}

fn flat(value: &str) -> ResourceKey<String> {
    ResourceKey::flat(k(value))
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

#[tokio::test]
async fn test_unloaded_key_is_empty() {
    let cache = Cache::new(MockResource::new());

    assert!(!cache.is_loaded(&flat("a")).unwrap());
    assert_eq!(cache.get(&k("a")), None);
    assert!(!cache.has(&k("a")));
}

#[tokio::test]
async fn test_load_caches_loader_result() {
    let mock = MockResource::new();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    let cache = Cache::new(mock);

    assert_eq!(cache.load_one(k("a")).await.unwrap(), Some(1));
    assert_eq!(cache.get(&k("a")), Some(1));
    assert!(cache.is_loaded(&flat("a")).unwrap());

    // Second load is served from the cache.
    assert_eq!(cache.load_one(k("a")).await.unwrap(), Some(1));
    assert_eq!(cache.resource().calls(), 1);
    cache.resource().verify();
}

#[tokio::test]
async fn test_failed_load_records_exception_and_retries() {
    let mock = MockResource::new();
    mock.expect_load(flat("a")).return_err("Test error");
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 7)]);
    let cache = Cache::new(mock);

    let (errors, seen) = counter();
    cache.on_data_error.add_handler(move |event, _| {
        assert_eq!(event.param, ResourceKey::flat("a".to_string()));
        assert_eq!(event.exception.to_string(), "Test error");
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = cache.load_one(k("a")).await.unwrap_err();
    assert_eq!(err.to_string(), "Test error");
    assert!(matches!(err.downcast_ref::<MockError>(), Some(MockError::Failed(_))));
    assert_eq!(cache.get(&k("a")), None);
    assert!(!cache.is_loaded(&flat("a")).unwrap());
    assert_eq!(
        cache.get_exception(&flat("a")).unwrap().unwrap().to_string(),
        "Test error"
    );
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    assert_eq!(cache.load_one(k("a")).await.unwrap(), Some(7));
    assert!(cache.get_exception(&flat("a")).unwrap().is_none());
    assert_eq!(cache.resource().calls(), 2);
}

#[tokio::test]
async fn test_set_then_delete() {
    let cache = Cache::new(MockResource::new());
    let (deletes, seen) = counter();
    cache.on_item_delete.add_handler(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    cache.set(k("a"), 1).unwrap();
    assert!(cache.has(&k("a")));

    cache.delete(&flat("a")).unwrap();
    assert_eq!(cache.get(&k("a")), None);
    assert!(!cache.has(&k("a")));
    assert!(!cache.is_loaded(&flat("a")).unwrap());
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_set_fires_item_update() {
    let cache = Cache::new(MockResource::new());
    let (updates, seen) = counter();
    cache.on_item_update.add_handler(move |key, _| {
        assert_eq!(*key, ResourceKey::flat("a".to_string()));
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    cache.set(k("a"), 1).unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mark_outdated_keeps_value_and_fires_once() {
    let mock = MockResource::new();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 2)]);
    let cache = Cache::new(mock);
    cache.set(k("a"), 1).unwrap();

    let (outdated, seen) = counter();
    cache.on_data_outdated.add_handler(move |key, _| {
        assert_eq!(*key, ResourceKey::flat("a".to_string()));
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    cache.mark_outdated(&flat("a")).unwrap();
    assert_eq!(cache.get(&k("a")), Some(1));
    assert!(cache.is_outdated(&flat("a")).unwrap());
    assert_eq!(outdated.load(Ordering::SeqCst), 1);

    // Outdated entries are reloaded.
    assert_eq!(cache.load_one(k("a")).await.unwrap(), Some(2));
    assert!(!cache.is_outdated(&flat("a")).unwrap());
    cache.resource().verify();
}

#[tokio::test]
async fn test_replace_drops_keys_not_in_list() {
    let cache = Cache::new(MockResource::new());
    cache.set(k("key1"), 1).unwrap();
    cache.set(k("key2"), 2).unwrap();

    cache
        .replace(vec![k("key1"), k("key3")], vec![10, 30])
        .unwrap();

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&k("key1")), Some(10));
    assert_eq!(cache.get(&k("key2")), None);
    assert_eq!(cache.get(&k("key3")), Some(30));
    assert!(!cache.is_loaded(&flat("key2")).unwrap());
}

#[tokio::test]
async fn test_handler_failure_does_not_fail_cache_operation() {
    let cache = Cache::new(MockResource::new());
    cache
        .on_item_update
        .add_handler(|_, _| Err(resource_framework::ExecutorError::message("listener broke")));

    cache.set(k("a"), 1).unwrap();
    assert_eq!(cache.get(&k("a")), Some(1));
}

#[tokio::test]
async fn test_invalid_key_is_rejected() {
    struct OddOnly;
    #[async_trait::async_trait]
    impl resource_framework::MapResource for OddOnly {
        type Key = u32;
        type Value = u32;
        type Error = MockError;
        type Extension = ();

        fn validate_key(&self, key: &u32) -> bool {
            key % 2 == 1
        }

        async fn loader(
            &self,
            _key: &ResourceKey<u32>,
            _ctx: &resource_framework::LoadContext<'_, Self>,
        ) -> Result<(), MockError> {
            Ok(())
        }
    }

    let cache = CachedMapResource::new(OddOnly);
    assert!(matches!(cache.set(2, 2), Err(ResourceError::InvalidKey(_))));
    assert!(matches!(cache.load_one(4).await, Err(ResourceError::InvalidKey(_))));
    assert!(cache.set(3, 3).is_ok());
}

#[tokio::test]
async fn test_alias_load_marks_concrete_keys_loaded() {
    const FIRST_TWO: AliasFactory = AliasFactory::list("first-two");

    struct Letters;
    #[async_trait::async_trait]
    impl resource_framework::MapResource for Letters {
        type Key = String;
        type Value = u32;
        type Error = MockError;
        type Extension = ();

        fn register_aliases(
            &self,
            aliases: &resource_framework::ResourceAliases<String>,
            _data: &resource_framework::DataMap<String, u32>,
        ) {
            aliases.add(&FIRST_TWO, |_| {
                ResourceKey::list(["a".to_string(), "b".to_string()])
            });
        }

        async fn loader(
            &self,
            key: &ResourceKey<String>,
            ctx: &resource_framework::LoadContext<'_, Self>,
        ) -> Result<(), MockError> {
            let resolved = ctx.resolve(key)?;
            for (index, key) in resolved.concrete_keys().unwrap_or_default().into_iter().enumerate() {
                ctx.set(key.clone(), index as u32)?;
            }
            Ok(())
        }
    }

    let cache = CachedMapResource::new(Letters);
    let values = cache.load(FIRST_TWO.key()).await.unwrap();
    assert_eq!(values, vec![Some(0), Some(1)]);

    assert!(cache.is_loaded(&FIRST_TWO.key()).unwrap());
    assert!(cache.is_loaded(&ResourceKey::list([k("a"), k("b")])).unwrap());
    assert!(!cache.is_loaded(&flat("c")).unwrap());
}

#[tokio::test]
async fn test_metadata_changes_are_published() {
    let cache = Cache::new(MockResource::new());
    let mut changes = cache.subscribe_metadata();

    cache.set(k("a"), 1).unwrap();
    cache.delete(&flat("a")).unwrap();

    assert_eq!(
        changes.recv().await.unwrap(),
        MetadataChange::Updated(MetadataKeyRef::Key(k("a")))
    );
    assert_eq!(
        changes.recv().await.unwrap(),
        MetadataChange::Deleted(MetadataKeyRef::Key(k("a")))
    );
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let cache = Cache::new(MockResource::new());
    cache.set(k("a"), 1).unwrap();
    cache.set(k("b"), 2).unwrap();

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.metadata().is_empty());
    assert!(cache.get_many(&ALL_KEYS.key()).unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_reloads_loaded_key() {
    let mock = MockResource::new();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 2)]);
    let cache = Cache::new(mock);

    cache.load_one(k("a")).await.unwrap();
    assert_eq!(cache.refresh(flat("a")).await.unwrap(), vec![Some(2)]);
    cache.resource().verify();
}

// --- Concurrent loads ---

#[tokio::test]
async fn test_concurrent_loads_share_one_loader_call() {
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    let cache = Cache::new(mock);

    let release = async {
        tokio::task::yield_now().await;
        assert!(cache.is_loading(&flat("a")).unwrap());
        cache.resource().release(1);
    };
    let (first, second, ()) = tokio::join!(cache.load_one(k("a")), cache.load_one(k("a")), release);

    assert_eq!(first.unwrap(), Some(1));
    assert_eq!(second.unwrap(), Some(1));
    assert_eq!(cache.resource().calls(), 1);
    assert!(!cache.is_loading(&flat("a")).unwrap());
    cache.resource().verify();
}

#[tokio::test]
async fn test_waiters_see_the_leaders_error() {
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_err("Test error");
    let cache = Cache::new(mock);

    let release = async {
        tokio::task::yield_now().await;
        cache.resource().release(1);
    };
    let (first, second, ()) = tokio::join!(cache.load_one(k("a")), cache.load_one(k("a")), release);

    assert_eq!(first.unwrap_err().to_string(), "Test error");
    assert_eq!(second.unwrap_err().to_string(), "Test error");
    assert_eq!(cache.resource().calls(), 1);
}

#[tokio::test]
async fn test_partly_overlapping_load_runs_for_its_own_keys() {
    let both = || ResourceKey::list([k("a"), k("b")]);
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_err("a failed");
    mock.expect_load(both()).return_err("b failed");
    let cache = Cache::new(mock);

    let (errors, seen) = counter();
    cache.on_data_error.add_handler(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let release = async {
        tokio::task::yield_now().await;
        cache.resource().release(2);
    };
    let (single, pair, ()) = tokio::join!(cache.load_one(k("a")), cache.load(both()), release);

    assert_eq!(single.unwrap_err().to_string(), "a failed");
    assert_eq!(pair.unwrap_err().to_string(), "b failed");
    assert_eq!(cache.resource().calls(), 2);
    assert_eq!(
        cache.get_exception(&flat("b")).unwrap().map(|e| e.to_string()),
        Some("b failed".to_string())
    );
    assert_eq!(errors.load(Ordering::SeqCst), 2);
    cache.resource().verify();
}

#[tokio::test]
async fn test_unresolvable_alias_after_load_is_a_failed_load() {
    const LOOP: AliasFactory = AliasFactory::list("loop");

    let mock = MockResource::new();
    mock.expect_any_load().return_ok(vec![]);
    let cache = Cache::new(mock);
    cache.aliases().add(&LOOP, |_| LOOP.key());

    let (errors, seen) = counter();
    cache.on_data_error.add_handler(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = cache.load(LOOP.key()).await.unwrap_err();
    assert!(matches!(err, ResourceError::AliasNotResolved(_)));
    assert!(!cache.is_loading(&LOOP.key()).unwrap());
    assert!(!cache.is_loaded(&LOOP.key()).unwrap());
    assert!(cache.get_exception(&LOOP.key()).unwrap().is_some());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_keys_load_independently() {
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    mock.expect_load(flat("b")).return_ok(vec![(k("b"), 2)]);
    let cache = Cache::new(mock);

    let release = async {
        tokio::task::yield_now().await;
        // Both loaders are waiting on the gate at the same time.
        assert_eq!(cache.resource().calls(), 2);
        cache.resource().release(2);
    };
    let (a, b, ()) = tokio::join!(cache.load_one(k("a")), cache.load_one(k("b")), release);

    assert_eq!(a.unwrap(), Some(1));
    assert_eq!(b.unwrap(), Some(2));
    assert_eq!(cache.resource().requested(), vec![flat("a"), flat("b")]);
}

#[tokio::test]
async fn test_delete_during_load_drops_late_result() {
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    let cache = Cache::new(mock);

    let delete = async {
        tokio::task::yield_now().await;
        cache.delete(&flat("a")).unwrap();
        cache.resource().release(1);
    };
    let (loaded, ()) = tokio::join!(cache.load_one(k("a")), delete);

    assert_eq!(loaded.unwrap(), None);
    assert!(!cache.has(&k("a")));
    assert!(!cache.is_loaded(&flat("a")).unwrap());
    assert!(cache.metadata().is_empty());
}

#[tokio::test]
async fn test_load_of_other_key_survives_delete() {
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    let cache = Cache::new(mock);
    cache.set(k("b"), 2).unwrap();

    let delete = async {
        tokio::task::yield_now().await;
        cache.delete(&flat("b")).unwrap();
        cache.resource().release(1);
    };
    let (loaded, ()) = tokio::join!(cache.load_one(k("a")), delete);

    assert_eq!(loaded.unwrap(), Some(1));
    assert!(cache.is_loaded(&flat("a")).unwrap());
    assert_eq!(cache.keys(), vec![k("a")]);
}

#[tokio::test]
async fn test_cancelled_load_can_be_retried() {
    let mock = MockResource::gated();
    mock.expect_load(flat("a")).return_ok(vec![(k("a"), 1)]);
    let cache = Cache::new(mock);

    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(10),
        cache.load_one(k("a")),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(!cache.is_loading(&flat("a")).unwrap());

    cache.resource().release(1);
    assert_eq!(cache.load_one(k("a")).await.unwrap(), Some(1));
    assert_eq!(cache.resource().calls(), 2);
    cache.resource().verify();
}

// --- Pagination ---

const SOURCE: [&str; 5] = ["a", "b", "c", "d", "e"];

struct Paged {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl resource_framework::MapResource for Paged {
    type Key = String;
    type Value = usize;
    type Error = ResourceError;
    type Extension = ();

    async fn loader(
        &self,
        key: &ResourceKey<String>,
        ctx: &resource_framework::LoadContext<'_, Self>,
    ) -> Result<(), ResourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (offset, limit) = key
            .as_alias()
            .and_then(|alias| alias.page())
            .unwrap_or((0, SOURCE.len()));
        for (index, name) in SOURCE.iter().enumerate().skip(offset).take(limit) {
            ctx.set(name.to_string(), index)?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_offset_pages_load_incrementally() {
    let cache = CachedMapResource::new(Paged {
        calls: AtomicUsize::new(0),
    });
    let all = ALL_KEYS.key::<String>();
    let page = |offset| ResourceKey::offset_page(&all, offset, 2).unwrap();

    assert_eq!(cache.load(page(0)).await.unwrap(), vec![Some(0), Some(1)]);
    assert!(cache.is_loaded(&page(0)).unwrap());
    assert!(!cache.is_loaded(&page(2)).unwrap());

    assert_eq!(cache.load(page(2)).await.unwrap(), vec![Some(2), Some(3)]);
    assert_eq!(cache.load(page(4)).await.unwrap(), vec![Some(4)]);

    // A short page marks the end of the list.
    assert!(cache.is_loaded(&page(6)).unwrap());
    assert_eq!(cache.load(page(0)).await.unwrap(), vec![Some(0), Some(1)]);
    assert_eq!(cache.resource().calls.load(Ordering::SeqCst), 3);

    // Pages share the list's metadata; outdating the list resets them.
    cache.mark_outdated(&all).unwrap();
    assert!(cache.is_outdated(&page(2)).unwrap());
    cache.load(page(0)).await.unwrap();
    assert!(!cache.is_loaded(&page(2)).unwrap());
    assert_eq!(cache.resource().calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_full_list_load_covers_every_page() {
    let cache = CachedMapResource::new(Paged {
        calls: AtomicUsize::new(0),
    });
    let all = ALL_KEYS.key::<String>();

    assert_eq!(cache.load(all.clone()).await.unwrap().len(), 5);
    let page = ResourceKey::offset_page(&all, 2, 2).unwrap();
    assert!(cache.is_loaded(&page).unwrap());
    assert_eq!(cache.load(page).await.unwrap(), vec![Some(2), Some(3)]);
    assert_eq!(cache.resource().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_later_page_loaded_first() {
    let cache = CachedMapResource::new(Paged {
        calls: AtomicUsize::new(0),
    });
    let all = ALL_KEYS.key::<String>();
    let page = |offset| ResourceKey::offset_page(&all, offset, 2).unwrap();

    assert_eq!(cache.load(page(2)).await.unwrap(), vec![Some(2), Some(3)]);
    assert!(!cache.is_loaded(&page(0)).unwrap());
    assert!(!cache.is_loaded(&page(4)).unwrap());

    assert_eq!(cache.load(page(0)).await.unwrap(), vec![Some(0), Some(1)]);
    assert_eq!(cache.load(page(2)).await.unwrap(), vec![Some(2), Some(3)]);
    assert_eq!(cache.resource().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_page_ignores_keys_cached_before_it() {
    let cache = CachedMapResource::new(Paged {
        calls: AtomicUsize::new(0),
    });
    cache.set(k("e"), 4).unwrap();
    let page = ResourceKey::offset_page(&ALL_KEYS.key::<String>(), 0, 2).unwrap();

    assert_eq!(cache.load(page).await.unwrap(), vec![Some(0), Some(1)]);
    assert_eq!(cache.keys(), vec![k("e"), k("a"), k("b")]);
}

#[tokio::test]
async fn test_replace_keeps_the_given_order() {
    let cache = Cache::new(MockResource::new());
    cache.set(k("b"), 2).unwrap();
    cache.set(k("a"), 1).unwrap();

    cache.replace(vec![k("a"), k("b")], vec![10, 20]).unwrap();

    assert_eq!(cache.keys(), vec![k("a"), k("b")]);
    assert_eq!(cache.get_many(&ALL_KEYS.key()).unwrap(), vec![Some(10), Some(20)]);
}
