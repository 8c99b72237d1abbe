use parking_lot::Mutex;
use resource_framework::{
    ContextCreator, ExecutionContext, ExecutorError, ExecutorHandlersCollection,
    ExecutorInterrupter, LinkPosition, SyncExecutor,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Order {
    item: String,
    quantity: u32,
}

type Log = Arc<Mutex<Vec<String>>>;

fn log_handler<T: 'static>(
    log: &Log,
    entry: &'static str,
) -> impl Fn(&T, &ExecutionContext) -> Result<(), ExecutorError> + Send + Sync + 'static {
    let log = log.clone();
    move |_: &T, _: &ExecutionContext| {
        log.lock().push(entry.to_string());
        Ok(())
    }
}

#[test]
fn test_full_chain_order() {
    let log: Log = Arc::default();
    let main = SyncExecutor::<Order>::new();
    let before = SyncExecutor::<Order>::new();
    let next = SyncExecutor::<Order>::new();

    before.add_handler(log_handler(&log, "before"));
    before.add_post_handler(log_handler(&log, "before:post"));
    main.add_handler(log_handler(&log, "main:1"));
    main.add_handler(log_handler(&log, "main:2"));
    main.add_post_handler(log_handler(&log, "main:post"));
    next.add_handler(log_handler(&log, "next"));
    main.before(&before).next(&next);

    main.execute(Order {
        item: "book".into(),
        quantity: 1,
    })
    .unwrap();

    assert_eq!(
        *log.lock(),
        vec!["before", "before:post", "main:1", "main:2", "main:post", "next"]
    );
}

#[test]
fn test_validation_interrupt_stops_submit_but_runs_cleanup() {
    let log: Log = Arc::default();
    let validate = SyncExecutor::<Order>::new();
    let submit = SyncExecutor::<Order>::new();

    let validated = log.clone();
    validate.add_handler(move |order, ctx| {
        validated.lock().push("validate".into());
        if order.quantity == 0 {
            ExecutorInterrupter::interrupt(ctx);
        }
        Ok(())
    });
    submit.before(&validate);
    submit.add_handler(log_handler(&log, "submit"));
    submit.add_post_handler(log_handler(&log, "cleanup"));

    let ctx = submit
        .execute(Order {
            item: "book".into(),
            quantity: 0,
        })
        .unwrap();

    assert!(ExecutorInterrupter::is_interrupted(&ctx));
    assert_eq!(*log.lock(), vec!["validate", "cleanup"]);
}

#[test]
fn test_interrupted_next_link_is_skipped() {
    let log: Log = Arc::default();
    let main = SyncExecutor::<u8>::new();
    let next = SyncExecutor::<u8>::new();
    main.add_handler(|_, ctx| {
        ExecutorInterrupter::interrupt(ctx);
        Ok(())
    });
    next.add_handler(log_handler(&log, "next"));
    main.next(&next);

    main.execute(1).unwrap();
    assert!(log.lock().is_empty());
}

#[test]
fn test_error_in_linked_executor_propagates() {
    let log: Log = Arc::default();
    let main = SyncExecutor::<u8>::new();
    let before = SyncExecutor::<u8>::new();
    before.add_handler(|_, _| Err(ExecutorError::message("rejected")));
    main.add_handler(log_handler(&log, "main"));
    main.before(&before);

    let err = main.execute(1).unwrap_err();
    assert_eq!(err.to_string(), "rejected");
    assert!(log.lock().is_empty());
}

#[test]
fn test_context_value_is_shared_across_chain() {
    let totals = ContextCreator::new(|_| Mutex::new(0u32));
    let validate = SyncExecutor::<Order>::new();
    let submit = SyncExecutor::<Order>::new();

    let token = totals.clone();
    validate.add_handler(move |order, ctx| {
        *ctx.get_context(&token).lock() += order.quantity;
        Ok(())
    });
    let token = totals.clone();
    submit.add_handler(move |order, ctx| {
        *ctx.get_context(&token).lock() += order.quantity * 10;
        Ok(())
    });
    submit.before(&validate);

    let ctx = submit
        .execute(Order {
            item: "pen".into(),
            quantity: 2,
        })
        .unwrap();
    assert_eq!(*ctx.get_context(&totals).lock(), 22);

    // A new execution starts from a fresh value.
    let ctx = submit
        .execute(Order {
            item: "pen".into(),
            quantity: 1,
        })
        .unwrap();
    assert_eq!(*ctx.get_context(&totals).lock(), 11);
}

#[test]
fn test_mapped_link_with_link_handlers() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let orders = SyncExecutor::<Order>::new();
    let items = SyncExecutor::<String>::new();

    let link = orders.collection().next_map(&items, |order: &Order, _: &ExecutionContext| {
        order.item.clone()
    });
    let items_seen = seen.clone();
    link.add_handler(move |item, _| {
        items_seen.lock().push(item.clone());
        Ok(())
    });

    orders
        .execute(Order {
            item: "lamp".into(),
            quantity: 1,
        })
        .unwrap();
    // Link handlers only run when the executor is reached through the link.
    items.execute("direct".into()).unwrap();

    assert_eq!(*seen.lock(), vec!["lamp"]);
}

#[test]
fn test_execute_scope_appends_collections() {
    let log: Log = Arc::default();
    let executor = SyncExecutor::<u8>::new();
    executor.add_handler(log_handler(&log, "base"));
    let scope = Arc::new(ExecutorHandlersCollection::<u8>::new());
    scope.add_handler(log_handler(&log, "scope"));
    scope.add_post_handler(log_handler(&log, "scope:post"));

    executor.execute_scope(1, &[scope]).unwrap();
    executor.execute(2).unwrap();

    assert_eq!(*log.lock(), vec!["base", "scope", "scope:post", "base"]);
}

#[test]
fn test_filtered_before_link() {
    let log: Log = Arc::default();
    let main = SyncExecutor::<u32>::new();
    let audit = SyncExecutor::<u32>::new();
    audit.add_handler(log_handler(&log, "audit"));
    main.collection().link(
        LinkPosition::Before,
        &audit,
        |value: &u32, _: &ExecutionContext| *value,
        Some(Arc::new(|value: &u32, _: &ExecutionContext| *value >= 100)),
    );

    main.execute(5).unwrap();
    main.execute(500).unwrap();
    assert_eq!(*log.lock(), vec!["audit"]);
}

#[test]
fn test_execute_in_reuses_interrupted_context() {
    let log: Log = Arc::default();
    let first = SyncExecutor::<()>::new();
    let second = SyncExecutor::<()>::new();
    first.add_handler(|_, ctx| {
        ExecutorInterrupter::interrupt(ctx);
        Ok(())
    });
    second.add_handler(log_handler(&log, "second"));
    second.add_post_handler(log_handler(&log, "second:post"));

    let ctx = first.execute(()).unwrap();
    second.execute_in(&(), &ctx).unwrap();
    assert!(log.lock().is_empty());
}
