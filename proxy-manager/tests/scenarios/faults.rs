//! Daemon and store failures.

use std::time::Duration;

use proxy_manager::daemon::{DaemonOp, Proxy, ToxicDirection};
use proxy_manager::{ControllerConfig, ControllerError, EventStore, RetryPolicy};

use crate::common::{assert_one_toxic_each, mem_reconciler};

#[tokio::test(start_paused = true)]
async fn add_toxic_succeeds_on_third_attempt() {
    let r = mem_reconciler(ControllerConfig::default());
    r.store().initialize().await.unwrap();

    // Both toxics present: the clear succeeds first try and only add_toxic backs off.
    for spec in &r.config().proxies {
        let mut proxy = Proxy::new(&spec.name, &spec.listen, &spec.upstream);
        proxy.toxics = vec![
            ToxicDirection::Up.timeout_toxic(4000),
            ToxicDirection::Down.timeout_toxic(4000),
        ];
        r.daemon().insert_proxy(proxy);
    }
    r.ensure_proxies().await.unwrap();
    r.daemon().fail_first(DaemonOp::AddToxic, 2);

    let start = tokio::time::Instant::now();
    let report = r.inject_toxics().await;
    let elapsed = start.elapsed();

    assert!(report.failed.is_empty(), "{report:?}");
    assert_one_toxic_each(&r);
    assert_eq!(r.daemon().count_calls(DaemonOp::AddToxic), 7 * 3);
    assert_eq!(r.daemon().count_calls(DaemonOp::CreateProxy), 0);
    // 100 ms + 200 ms of backoff per proxy.
    let backoff = Duration::from_millis(300) * 7;
    assert!(
        elapsed >= backoff && elapsed < backoff + Duration::from_millis(50),
        "{elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn persistent_listing_failure_hits_error_limit() {
    let r = mem_reconciler(ControllerConfig::fast_local());
    r.store().initialize().await.unwrap();
    r.store().fail_list_events(u32::MAX);

    let err = r.run().await.unwrap_err();
    match &err {
        ControllerError::ErrorLimit { count, last } => {
            assert_eq!(*count, 15);
            assert_eq!(last.attempts, 3);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(r.store().list_calls(), 15 * 3);
    assert_eq!(r.daemon().count_calls(DaemonOp::DeleteProxy), 7);
    assert!(r.daemon().proxy_names().is_empty());
    assert!(r.store().is_closed());
}

#[tokio::test(start_paused = true)]
async fn shutdown_attempts_every_proxy_despite_failures() {
    let r = mem_reconciler(ControllerConfig::fast_local());
    r.store().initialize().await.unwrap();
    r.daemon().fail_always(DaemonOp::DeleteProxy, "search_proxy");
    r.daemon().fail_always(DaemonOp::DeleteProxy, "translator_proxy");
    r.store().set_progress(1, 1);

    r.run().await.unwrap();

    let attempted = r.daemon().proxies_called(DaemonOp::DeleteProxy);
    for spec in &r.config().proxies {
        assert!(attempted.contains(&spec.name), "{} not attempted", spec.name);
    }
    assert_eq!(
        r.daemon().proxy_names(),
        vec!["search_proxy".to_string(), "translator_proxy".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_daemon_fails_startup_and_still_cleans_up() {
    let r = mem_reconciler(
        ControllerConfig::fast_local().with_retry(RetryPolicy::new(2, Duration::from_millis(5))),
    );
    r.daemon().set_unreachable(true);

    let err = r.run().await.unwrap_err();
    match &err {
        ControllerError::ProxyCreation { name, source } => {
            assert_eq!(name, "search_proxy");
            assert_eq!(source.attempts, 2);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(r.is_shut_down());
    assert!(r.shutdown_token().is_cancelled());
    assert!(r.store().is_closed());
}

#[tokio::test(start_paused = true)]
async fn events_survive_a_failed_tick() {
    let r = mem_reconciler(ControllerConfig::fast_local());
    r.store().initialize().await.unwrap();
    r.ensure_proxies().await.unwrap();
    r.store().set_inject(1);
    r.store().fail_list_events(3);

    assert!(r.process_events().await.is_err());
    assert_eq!(r.store().events().len(), 1);

    assert_eq!(r.process_events().await.unwrap(), 1);
    assert!(r.store().events().is_empty());
    assert_one_toxic_each(&r);
}
