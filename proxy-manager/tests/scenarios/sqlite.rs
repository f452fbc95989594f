//! The reconciler against a SQLite store with the real inject trigger.

use std::time::Duration;

use proxy_manager::daemon::DaemonOp;
use proxy_manager::{app, ControllerConfig, RunOutcome, SqliteStore, TokioProviders};
use tempfile::TempDir;

use crate::common::{assert_no_toxics, assert_one_toxic_each, reconciler};

#[tokio::test(start_paused = true)]
async fn inject_round_trip_leaves_proxies_clean() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("state.db")).unwrap();
    let r = reconciler(store, ControllerConfig::fast_local());

    let (outcome, ()) = tokio::join!(r.run(), async {
        tokio::time::sleep(Duration::from_millis(25)).await;
        r.store().set_inject(1).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_one_toxic_each(&r);

        r.store().set_inject(0).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_no_toxics(&r);

        // Writing the same value again must not produce an event.
        r.store().set_inject(0).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        r.store().set_progress(10, 10).unwrap();
    });

    assert_eq!(outcome.unwrap(), RunOutcome::Completed);
    assert_eq!(r.daemon().count_calls(DaemonOp::AddToxic), 7);
    assert!(r.daemon().proxy_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn events_written_before_start_are_consumed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");
    {
        let writer = SqliteStore::open(&path).unwrap();
        proxy_manager::EventStore::initialize(&writer).await.unwrap();
        writer.set_inject(1).unwrap();
    }

    let r = reconciler(SqliteStore::open(&path).unwrap(), ControllerConfig::fast_local());
    let (outcome, ()) = tokio::join!(r.run(), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_one_toxic_each(&r);
        r.store().set_progress(1, 1).unwrap();
    });

    assert_eq!(outcome.unwrap(), RunOutcome::Completed);
    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.inject().unwrap(), 1);
}

#[tokio::test]
async fn open_store_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let config =
        ControllerConfig::fast_local().with_db_path(dir.path().join("nested/state/state.db"));
    let providers = TokioProviders::seeded(0);

    let store = app::open_store(proxy_manager::Providers::time(&providers), &config)
        .await
        .unwrap();
    assert_eq!(store.path(), config.db_path.as_path());
    assert!(dir.path().join("nested/state").is_dir());
}
