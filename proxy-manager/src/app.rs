//! Process wiring: store opening, health server, signal watcher and the
//! reconciler, joined by one cancellation token.

use std::io;

use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::daemon::ProxyDaemon;
use crate::error::ControllerError;
use crate::health;
use crate::providers::{Providers, TimeProvider};
use crate::reconciler::{Reconciler, RunOutcome};
use crate::retry::retry;
use crate::store::{EventStore, SqliteStore};

/// Build the runtime the binary runs on.
///
/// Multi-threaded so spawned tasks, the health server among them, keep
/// running while a blocking SQLite call holds the `block_on` thread.
pub fn runtime() -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
}

/// Open the SQLite store at `config.db_path`, retrying with the configured policy.
pub async fn open_store<TP: TimeProvider>(
    time: &TP,
    config: &ControllerConfig,
) -> Result<SqliteStore, ControllerError> {
    let store = retry(time, &config.retry, || async {
        SqliteStore::open(&config.db_path)
    })
    .await
    .map_err(ControllerError::StoreOpen)?;
    tracing::info!(path = %config.db_path.display(), "store opened");
    Ok(store)
}

/// Resolve on SIGINT or SIGTERM, returning the signal name.
#[cfg(unix)]
pub async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Resolve on ctrl-c.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

/// Run the controller until it completes, is signalled, or fails.
///
/// The health server is bound before the reconciler starts and is stopped,
/// with its grace period, after the reconciler returns.
pub async fn serve<S, D, P>(
    store: S,
    daemon: D,
    providers: P,
    config: ControllerConfig,
) -> Result<RunOutcome, ControllerError>
where
    S: EventStore,
    D: ProxyDaemon,
    P: Providers,
{
    let token = CancellationToken::new();
    let health = health::spawn(
        config.health_socket_addr()?,
        config.health_shutdown_grace,
        token.clone(),
    )
    .await?;

    let signals = tokio::spawn({
        let token = token.clone();
        async move {
            tokio::select! {
                _ = token.cancelled() => {}
                res = wait_for_signal() => match res {
                    Ok(signal) => {
                        tracing::info!(signal, "received signal, shutting down");
                        token.cancel();
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to install signal handlers"),
                },
            }
        }
    });

    let reconciler = Reconciler::new(store, daemon, providers, config, token.clone());
    let outcome = reconciler.run().await;

    token.cancel();
    signals.abort();
    health.join().await;
    outcome
}
