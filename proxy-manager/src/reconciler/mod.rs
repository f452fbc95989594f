//! The reconciliation loop.
//!
//! # Lifecycle
//!
//! ```text
//! run()
//!   ├─ initialize store            (retried, fatal)
//!   ├─ ensure_proxies()            (create missing, fatal)
//!   └─ loop every poll_interval
//!        ├─ process_events()       inject / remove passes, mark, delete
//!        ├─ read_control()         count == data_size → Completed
//!        └─ sleep                  pre-empted by the shutdown token
//! ```
//!
//! Every exit path goes through [`Reconciler::shutdown`], which deletes the
//! configured proxies, cancels the shared token and closes the store. The
//! [`ShutdownGuard`] makes that sequence run at most once.

mod shutdown;
mod toxics;

pub use shutdown::{ShutdownGuard, ShutdownReason};
pub use toxics::{PassKind, PassReport};

use std::fmt::Display;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::daemon::{DaemonError, ProxyDaemon};
use crate::error::ControllerError;
use crate::providers::{Providers, TimeProvider};
use crate::retry::{retry, RetryError};
use crate::store::{EventKind, EventStore, StoreError};

/// How a run that did not fail ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The control row reported `count == data_size`.
    Completed,
    /// The shutdown token was cancelled.
    Cancelled,
}

/// Drives proxy state from the event table.
pub struct Reconciler<S, D, P>
where
    S: EventStore,
    D: ProxyDaemon,
    P: Providers,
{
    store: S,
    daemon: D,
    providers: P,
    config: ControllerConfig,
    shutdown: CancellationToken,
    guard: ShutdownGuard,
}

impl<S, D, P> Reconciler<S, D, P>
where
    S: EventStore,
    D: ProxyDaemon,
    P: Providers,
{
    /// Create a reconciler. Cancelling `shutdown` stops the loop at the next
    /// event boundary.
    pub fn new(
        store: S,
        daemon: D,
        providers: P,
        config: ControllerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            daemon,
            providers,
            config,
            shutdown,
            guard: ShutdownGuard::new(),
        }
    }

    /// The event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The proxy daemon.
    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    /// The active configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Token cancelled by shutdown; shared with the health server.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// True once the shutdown sequence has started.
    pub fn is_shut_down(&self) -> bool {
        self.guard.has_fired()
    }

    async fn retried<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        retry(self.providers.time(), &self.config.retry, operation).await
    }

    /// Run until completion, cancellation or a fatal error.
    pub async fn run(&self) -> Result<RunOutcome, ControllerError> {
        if let Err(e) = self.retried(|| self.store.initialize()).await {
            tracing::error!(error = %e, "failed to initialize store");
            self.shutdown(ShutdownReason::StartupFailed).await;
            return Err(ControllerError::StoreInit(e));
        }
        if let Err(e) = self.ensure_proxies().await {
            tracing::error!(error = %e, "failed to create proxies");
            self.shutdown(ShutdownReason::StartupFailed).await;
            return Err(e);
        }
        tracing::info!(
            proxies = self.config.proxies.len(),
            poll_interval = ?self.config.poll_interval,
            "reconciler started"
        );

        let mut error_count: u32 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                self.shutdown(ShutdownReason::Cancelled).await;
                return Ok(RunOutcome::Cancelled);
            }

            match self.process_events().await {
                Ok(_) => error_count = 0,
                Err(e) => {
                    error_count += 1;
                    tracing::error!(error = %e, error_count, "error processing events");
                    if error_count >= self.config.max_error_count {
                        self.shutdown(ShutdownReason::ErrorLimit).await;
                        return Err(ControllerError::ErrorLimit {
                            count: error_count,
                            last: e,
                        });
                    }
                }
            }

            if self.shutdown.is_cancelled() {
                self.shutdown(ShutdownReason::Cancelled).await;
                return Ok(RunOutcome::Cancelled);
            }

            match self.retried(|| self.store.read_control()).await {
                Ok(state) if state.is_complete() => {
                    tracing::info!(count = state.count, data_size = state.data_size, "work complete");
                    self.shutdown(ShutdownReason::Completed).await;
                    return Ok(RunOutcome::Completed);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to fetch state of store");
                    self.shutdown(ShutdownReason::ControlReadFailed).await;
                    return Err(ControllerError::ControlRead(e));
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = self.providers.time().sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Create every configured proxy the daemon does not know.
    ///
    /// The existence check is not retried: any lookup error leads to a
    /// create attempt, and a conflict on create means the proxy exists.
    pub async fn ensure_proxies(&self) -> Result<(), ControllerError> {
        for spec in &self.config.proxies {
            match self.daemon.get_proxy(&spec.name).await {
                Ok(_) => {
                    tracing::info!(proxy = %spec.name, "proxy already exists");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(proxy = %spec.name, error = %e, "proxy lookup failed, creating");
                }
            }

            let created = self
                .retried(|| {
                    self.daemon
                        .create_proxy(&spec.name, &spec.listen, &spec.upstream)
                })
                .await;
            match created {
                Ok(_) => {
                    tracing::info!(proxy = %spec.name, listen = %spec.listen, upstream = %spec.upstream, "created proxy");
                }
                Err(e) if matches!(e.last, DaemonError::AlreadyExists(_)) => {
                    tracing::info!(proxy = %spec.name, "proxy already exists");
                }
                Err(source) => {
                    return Err(ControllerError::ProxyCreation {
                        name: spec.name.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply and consume every pending event, oldest first.
    ///
    /// Returns the number of events consumed. Only a failed listing is an
    /// error; mark and delete failures are logged. Rows already marked
    /// processed are deleted without being applied again.
    pub async fn process_events(&self) -> Result<usize, RetryError<StoreError>> {
        let events = self.retried(|| self.store.list_pending_events()).await?;

        let mut consumed = 0;
        for event in events {
            if self.shutdown.is_cancelled() {
                tracing::info!(event_id = event.id, "cancelled, leaving remaining events");
                break;
            }

            if event.is_pending() {
                match event.kind() {
                    EventKind::Inject => {
                        tracing::info!(event_id = event.id, "injecting toxics");
                        let report = self.inject_toxics().await;
                        log_report(&report);
                    }
                    EventKind::Remove => {
                        tracing::info!(event_id = event.id, "removing toxics");
                        let report = self.remove_toxics().await;
                        log_report(&report);
                    }
                    EventKind::Unknown(kind) => {
                        tracing::warn!(event_id = event.id, event_type = %kind, "unknown event type");
                    }
                }
                if let Err(e) = self.retried(|| self.store.mark_processed(event.id)).await {
                    tracing::warn!(event_id = event.id, error = %e, "failed to mark event processed");
                }
            }

            if let Err(e) = self.retried(|| self.store.delete_event(event.id)).await {
                tracing::warn!(event_id = event.id, error = %e, "failed to delete event");
            }
            consumed += 1;
        }
        Ok(consumed)
    }

    /// Delete the configured proxies, cancel the token and close the store.
    ///
    /// Returns false if another caller already ran the sequence.
    pub async fn shutdown(&self, reason: ShutdownReason) -> bool {
        if !self.guard.begin() {
            tracing::debug!(%reason, "shutdown already in progress");
            return false;
        }
        tracing::info!(%reason, uptime = ?self.providers.time().now(), "shutting down");

        let report = self.delete_proxies().await;
        log_report(&report);

        self.shutdown.cancel();
        if let Err(e) = self.store.close().await {
            tracing::warn!(error = %e, "failed to close store");
        }
        true
    }
}

fn log_report(report: &PassReport) {
    if report.failed.is_empty() && report.skipped.is_empty() {
        tracing::info!(pass = %report.kind, proxies = report.succeeded.len(), "pass complete");
    } else {
        tracing::warn!(
            pass = %report.kind,
            succeeded = report.succeeded.len(),
            skipped = ?report.skipped,
            failed = ?report.failed_proxies(),
            "pass finished with errors"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxySpec;
    use crate::daemon::{DaemonOp, InMemoryDaemon, Proxy};
    use crate::providers::TokioProviders;
    use crate::store::InMemoryStore;

    type TestReconciler = Reconciler<InMemoryStore, InMemoryDaemon, TokioProviders>;

    fn reconciler(config: ControllerConfig) -> TestReconciler {
        Reconciler::new(
            InMemoryStore::new(),
            InMemoryDaemon::new(),
            TokioProviders::seeded(1),
            config,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn ensure_proxies_creates_missing_only() {
        let r = reconciler(ControllerConfig::fast_local());
        r.daemon()
            .insert_proxy(Proxy::new("search_proxy", "0.0.0.0:6000", "search_tool:5000"));

        r.ensure_proxies().await.unwrap();

        assert_eq!(r.daemon().proxy_names().len(), 7);
        let created = r.daemon().proxies_called(DaemonOp::CreateProxy);
        assert_eq!(created.len(), 6);
        assert!(!created.contains(&"search_proxy".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_proxies_fails_when_create_keeps_failing() {
        let r = reconciler(ControllerConfig::fast_local());
        r.daemon().fail_always(DaemonOp::CreateProxy, "movie_proxy");

        let err = r.ensure_proxies().await.unwrap_err();
        match err {
            ControllerError::ProxyCreation { name, source } => {
                assert_eq!(name, "movie_proxy");
                assert_eq!(source.attempts, 3);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_applied_in_order_then_deleted() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.ensure_proxies().await.unwrap();

        r.store().set_inject(1);
        r.store().set_inject(0);
        assert_eq!(r.process_events().await.unwrap(), 2);

        assert!(r.store().events().is_empty());
        for name in r.daemon().proxy_names() {
            assert!(r.daemon().toxics_of(&name).unwrap().is_empty());
        }
        assert_eq!(r.daemon().count_calls(DaemonOp::AddToxic), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_and_processed_events_are_dropped() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.ensure_proxies().await.unwrap();

        r.store().push_event("something_else", 0, 1);
        let stale = r.store().push_event("inject_changed", 0, 1);
        r.store().mark_processed(stale).await.unwrap();

        assert_eq!(r.process_events().await.unwrap(), 2);
        assert!(r.store().events().is_empty());
        assert_eq!(r.daemon().count_calls(DaemonOp::AddToxic), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mark_still_deletes() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.ensure_proxies().await.unwrap();
        r.store().set_inject(1);
        r.store().fail_mark_processed(u32::MAX);

        assert_eq!(r.process_events().await.unwrap(), 1);
        assert!(r.store().events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_leaves_remaining_events() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.store().set_inject(1);
        r.shutdown_token().cancel();

        assert_eq!(r.process_events().await.unwrap(), 0);
        assert_eq!(r.store().events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_runs_once() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.ensure_proxies().await.unwrap();

        assert!(r.shutdown(ShutdownReason::Completed).await);
        assert!(!r.shutdown(ShutdownReason::Cancelled).await);

        assert_eq!(r.daemon().count_calls(DaemonOp::DeleteProxy), 7);
        assert!(r.daemon().proxy_names().is_empty());
        assert!(r.shutdown_token().is_cancelled());
        assert!(r.store().is_closed());
        assert!(r.is_shut_down());
    }

    #[tokio::test(start_paused = true)]
    async fn run_completes_when_progress_reaches_target() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.store().set_progress(3, 3);

        assert_eq!(r.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(r.daemon().count_calls(DaemonOp::CreateProxy), 7);
        assert!(r.daemon().proxy_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancelled_token() {
        let r = reconciler(
            ControllerConfig::fast_local()
                .with_proxies(vec![ProxySpec::new("only_proxy", "0.0.0.0:7000", "only:1")]),
        );
        r.shutdown_token().cancel();

        assert_eq!(r.run().await.unwrap(), RunOutcome::Cancelled);
        assert_eq!(
            r.daemon().proxies_called(DaemonOp::DeleteProxy),
            vec!["only_proxy".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn listing_success_resets_error_counter() {
        let r = reconciler(ControllerConfig::fast_local().with_max_error_count(2));
        r.store().initialize().await.unwrap();
        // Each failed tick consumes three attempts.
        r.store().fail_list_events(3);

        let token = r.shutdown_token().clone();
        let (outcome, ()) = tokio::join!(r.run(), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            token.cancel();
        });

        assert_eq!(outcome.unwrap(), RunOutcome::Cancelled);
        assert!(r.store().list_calls() > 3);
    }

    #[tokio::test(start_paused = true)]
    async fn control_read_failure_is_fatal() {
        let r = reconciler(ControllerConfig::fast_local());
        r.store().initialize().await.unwrap();
        r.store().fail_read_control(u32::MAX);

        let err = r.run().await.unwrap_err();
        assert!(matches!(err, ControllerError::ControlRead(_)), "{err}");
        assert!(r.daemon().proxy_names().is_empty());
        assert!(r.store().is_closed());
    }
}
