//! Inject, remove and delete passes over the configured proxies.
//!
//! Every pass visits the proxies in configuration order and isolates
//! failures: a proxy whose daemon calls fail is logged and recorded in the
//! [`PassReport`], and the pass moves on to the next proxy.

use std::fmt;

use crate::config::ProxySpec;
use crate::daemon::{DaemonError, Proxy, ProxyDaemon, ToxicDirection, TOXIC_NAMES};
use crate::providers::{Providers, RandomProvider};
use crate::retry::RetryError;
use crate::store::EventStore;

use super::Reconciler;

/// Which pass produced a [`PassReport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// Toxic installation.
    Inject,
    /// Toxic removal.
    Remove,
    /// Proxy deletion during shutdown.
    Delete,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Inject => f.write_str("inject"),
            PassKind::Remove => f.write_str("remove"),
            PassKind::Delete => f.write_str("delete"),
        }
    }
}

/// Per-proxy outcome of one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassReport {
    /// Pass that produced the report.
    pub kind: PassKind,
    /// Proxies the pass fully handled.
    pub succeeded: Vec<String>,
    /// Proxies left untouched on purpose (toxics survived the clear).
    pub skipped: Vec<String>,
    /// Proxies whose daemon calls failed, with the error text.
    pub failed: Vec<(String, String)>,
}

impl PassReport {
    fn new(kind: PassKind) -> Self {
        Self {
            kind,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn fail(&mut self, proxy: &str, error: impl fmt::Display) {
        self.failed.push((proxy.to_string(), error.to_string()));
    }

    /// True when no proxy failed or was skipped.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Names of the proxies that failed.
    pub fn failed_proxies(&self) -> Vec<&str> {
        self.failed.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl<S, D, P> Reconciler<S, D, P>
where
    S: EventStore,
    D: ProxyDaemon,
    P: Providers,
{
    /// Fetch the daemon's handle for a configured proxy.
    async fn resolve(&self, spec: &ProxySpec) -> Result<Proxy, RetryError<DaemonError>> {
        self.retried(|| self.daemon.get_proxy(&spec.name)).await
    }

    /// Install one timeout toxic on every configured proxy.
    ///
    /// Each proxy is cleared first, then checked: if toxics survive the clear,
    /// or the clear failed and the check cannot run, nothing is added, so a
    /// proxy never carries two controller toxics.
    pub async fn inject_toxics(&self) -> PassReport {
        let mut report = PassReport::new(PassKind::Inject);
        for spec in &self.config.proxies {
            let proxy = match self.resolve(spec).await {
                Ok(proxy) => proxy,
                Err(e) => {
                    tracing::warn!(proxy = %spec.name, error = %e, "failed to get proxy");
                    report.fail(&spec.name, e);
                    continue;
                }
            };

            let cleared = self.remove_toxics_for_proxy(&proxy).await.is_ok();

            // An unverifiable list is only trusted as empty after a clean clear.
            let has_toxic = match self.retried(|| self.daemon.list_toxics(&proxy)).await {
                Ok(toxics) => !toxics.is_empty(),
                Err(e) => {
                    tracing::warn!(proxy = %proxy.name, error = %e, cleared, "error fetching toxics");
                    !cleared
                }
            };
            if has_toxic {
                tracing::warn!(proxy = %proxy.name, "toxics survived clear, not adding another");
                report.skipped.push(proxy.name.clone());
                continue;
            }

            let direction = self.pick_direction();
            let toxic = direction.timeout_toxic(self.timeout_for(direction));
            if let Err(e) = self.retried(|| self.daemon.add_toxic(&proxy, &toxic)).await {
                tracing::warn!(proxy = %proxy.name, error = %e, "failed to add toxic");
                report.fail(&proxy.name, e);
                continue;
            }
            if let Err(e) = self.retried(|| self.daemon.save(&proxy)).await {
                tracing::warn!(proxy = %proxy.name, error = %e, "failed to save proxy");
            }
            tracing::info!(proxy = %proxy.name, toxic = direction.name(), "injected toxic");
            report.succeeded.push(proxy.name.clone());
        }
        report
    }

    /// Clear the controller's toxics from every configured proxy.
    pub async fn remove_toxics(&self) -> PassReport {
        let mut report = PassReport::new(PassKind::Remove);
        for spec in &self.config.proxies {
            let proxy = match self.resolve(spec).await {
                Ok(proxy) => proxy,
                Err(e) => {
                    tracing::warn!(proxy = %spec.name, error = %e, "failed to get proxy");
                    report.fail(&spec.name, e);
                    continue;
                }
            };
            match self.remove_toxics_for_proxy(&proxy).await {
                Ok(()) => report.succeeded.push(proxy.name.clone()),
                Err(e) => report.fail(&proxy.name, e),
            }
        }
        report
    }

    /// Remove both timeout toxics from one proxy, then save it.
    ///
    /// A toxic that is not installed yields `NotFound` from the daemon; that
    /// is expected and does not count as a failure. Any other error is
    /// logged and returned after the remaining toxic has been attempted.
    pub async fn remove_toxics_for_proxy(&self, proxy: &Proxy) -> Result<(), RetryError<DaemonError>> {
        let mut first_failure = None;
        for toxic in TOXIC_NAMES {
            match self.retried(|| self.daemon.remove_toxic(proxy, toxic)).await {
                Ok(()) => {
                    tracing::info!(proxy = %proxy.name, toxic, "removed toxic");
                }
                Err(e) if e.last.is_not_found() => {
                    tracing::debug!(proxy = %proxy.name, toxic, "toxic not present");
                }
                Err(e) => {
                    tracing::warn!(proxy = %proxy.name, toxic, error = %e, "failed to remove toxic");
                    first_failure.get_or_insert(e);
                }
            }
        }
        if let Err(e) = self.retried(|| self.daemon.save(proxy)).await {
            tracing::warn!(proxy = %proxy.name, error = %e, "failed to save proxy");
            first_failure.get_or_insert(e);
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delete every configured proxy, best effort.
    pub async fn delete_proxies(&self) -> PassReport {
        let mut report = PassReport::new(PassKind::Delete);
        for spec in &self.config.proxies {
            let proxy = match self.resolve(spec).await {
                Ok(proxy) => proxy,
                Err(e) => {
                    tracing::warn!(proxy = %spec.name, error = %e, "failed to get proxy");
                    report.fail(&spec.name, e);
                    continue;
                }
            };
            match self.retried(|| self.daemon.delete_proxy(&proxy)).await {
                Ok(()) => {
                    tracing::info!(proxy = %proxy.name, "deleted proxy");
                    report.succeeded.push(proxy.name.clone());
                }
                Err(e) => {
                    tracing::warn!(proxy = %proxy.name, error = %e, "failed to delete proxy");
                    report.fail(&proxy.name, e);
                }
            }
        }
        report
    }

    fn pick_direction(&self) -> ToxicDirection {
        if self.providers.random().random_bool(0.5) {
            ToxicDirection::Up
        } else {
            ToxicDirection::Down
        }
    }

    fn timeout_for(&self, direction: ToxicDirection) -> u64 {
        match direction {
            ToxicDirection::Up => self.config.timeout_up_ms,
            ToxicDirection::Down => self.config.timeout_down_ms,
        }
    }
}
