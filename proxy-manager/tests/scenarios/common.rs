//! Shared builders and assertions.

use proxy_manager::daemon::TOXIC_NAMES;
use proxy_manager::{
    ControllerConfig, EventStore, InMemoryDaemon, InMemoryStore, Reconciler, TokioProviders,
};
use tokio_util::sync::CancellationToken;

pub type MemReconciler = Reconciler<InMemoryStore, InMemoryDaemon, TokioProviders>;

pub fn reconciler<S: EventStore>(
    store: S,
    config: ControllerConfig,
) -> Reconciler<S, InMemoryDaemon, TokioProviders> {
    Reconciler::new(
        store,
        InMemoryDaemon::new(),
        TokioProviders::seeded(42),
        config,
        CancellationToken::new(),
    )
}

pub fn mem_reconciler(config: ControllerConfig) -> MemReconciler {
    reconciler(InMemoryStore::new(), config)
}

/// Every configured proxy carries exactly one controller toxic.
pub fn assert_one_toxic_each<S: EventStore>(r: &Reconciler<S, InMemoryDaemon, TokioProviders>) {
    for spec in &r.config().proxies {
        let toxics = r
            .daemon()
            .toxics_of(&spec.name)
            .unwrap_or_else(|| panic!("{} missing", spec.name));
        assert_eq!(toxics.len(), 1, "{}: {toxics:?}", spec.name);
        assert!(TOXIC_NAMES.contains(&toxics[0].name.as_str()));
    }
}

/// No configured proxy carries a controller toxic.
pub fn assert_no_toxics<S: EventStore>(r: &Reconciler<S, InMemoryDaemon, TokioProviders>) {
    for spec in &r.config().proxies {
        let toxics = r.daemon().toxics_of(&spec.name).unwrap_or_default();
        assert!(
            toxics.iter().all(|t| !TOXIC_NAMES.contains(&t.name.as_str())),
            "{}: {toxics:?}",
            spec.name
        );
    }
}
