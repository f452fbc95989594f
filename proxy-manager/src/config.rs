//! Controller configuration.
//!
//! All tunables live in [`ControllerConfig`]. [`Default`] carries the
//! production values; tests use [`ControllerConfig::fast_local`] so retry
//! chains and poll ticks stay short.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

/// Address of the Toxiproxy REST API.
pub const DEFAULT_DAEMON_ADDR: &str = "toxiproxy:8474";

/// Location of the shared SQLite store.
pub const DEFAULT_DB_PATH: &str = "./state/state.db";

/// Bind address of the liveness endpoint.
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8000";

/// Reconciler tick.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive failed event listings before the controller gives up.
pub const DEFAULT_MAX_ERROR_COUNT: u32 = 15;

/// Timeout attribute of both toxics, in milliseconds.
pub const DEFAULT_TOXIC_TIMEOUT_MS: u64 = 4000;

/// Grace period for in-flight health requests on shutdown.
pub const DEFAULT_HEALTH_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One proxy the controller owns on the daemon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxySpec {
    /// Unique proxy name.
    pub name: String,

    /// Address the daemon binds for this proxy.
    pub listen: String,

    /// Address the daemon forwards to.
    pub upstream: String,
}

impl ProxySpec {
    /// Create a proxy entry.
    pub fn new(
        name: impl Into<String>,
        listen: impl Into<String>,
        upstream: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            upstream: upstream.into(),
        }
    }
}

const TOOL_PROXIES: [(&str, &str, &str); 7] = [
    ("search_proxy", "0.0.0.0:6000", "search_tool:5000"),
    ("weather_proxy", "0.0.0.0:6001", "weather_tool:5001"),
    ("movie_proxy", "0.0.0.0:6002", "movie_tool:5002"),
    ("calendar_proxy", "0.0.0.0:6003", "calendar_tool:5003"),
    ("calculator_proxy", "0.0.0.0:6004", "calculator_tool:5004"),
    ("message_proxy", "0.0.0.0:6005", "message_tool:5005"),
    ("translator_proxy", "0.0.0.0:6006", "translator_tool:5006"),
];

/// The proxies fronting the tool services, in reconciliation order.
pub fn default_proxies() -> Vec<ProxySpec> {
    TOOL_PROXIES
        .iter()
        .map(|(name, listen, upstream)| ProxySpec::new(*name, *listen, *upstream))
        .collect()
}

/// Configuration errors reported by [`ControllerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two proxy entries share a name.
    #[error("duplicate proxy name: {0}")]
    DuplicateProxy(String),

    /// The proxy table is empty.
    #[error("no proxies configured")]
    NoProxies,

    /// The retry policy would never run an operation.
    #[error("retry policy must allow at least one attempt")]
    ZeroAttempts,

    /// The error threshold would abort before the first tick.
    #[error("max error count must be at least 1")]
    ZeroErrorCount,

    /// The health bind address does not parse.
    #[error("invalid health address {addr}: {reason}")]
    InvalidHealthAddr {
        /// Offending address.
        addr: String,
        /// Parser message.
        reason: String,
    },
}

/// Every tunable of the controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// `host:port` of the Toxiproxy API, optionally prefixed with `http://`.
    pub daemon_addr: String,

    /// Path of the SQLite store.
    pub db_path: PathBuf,

    /// Bind address of the health endpoint.
    pub health_addr: String,

    /// Delay between reconciler ticks.
    pub poll_interval: Duration,

    /// Retry policy applied to every store and daemon call.
    pub retry: RetryPolicy,

    /// Consecutive failed event listings tolerated before a fatal exit.
    pub max_error_count: u32,

    /// Timeout attribute of `toxic_timeout_up`, in milliseconds.
    pub timeout_up_ms: u64,

    /// Timeout attribute of `toxic_timeout_down`, in milliseconds.
    pub timeout_down_ms: u64,

    /// Grace period given to the health server on shutdown.
    pub health_shutdown_grace: Duration,

    /// Proxies owned by the controller.
    pub proxies: Vec<ProxySpec>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            daemon_addr: DEFAULT_DAEMON_ADDR.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            health_addr: DEFAULT_HEALTH_ADDR.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            max_error_count: DEFAULT_MAX_ERROR_COUNT,
            timeout_up_ms: DEFAULT_TOXIC_TIMEOUT_MS,
            timeout_down_ms: DEFAULT_TOXIC_TIMEOUT_MS,
            health_shutdown_grace: DEFAULT_HEALTH_SHUTDOWN_GRACE,
            proxies: default_proxies(),
        }
    }
}

impl ControllerConfig {
    /// Configuration for in-process tests: 1 ms backoff, 10 ms ticks,
    /// health endpoint on an ephemeral loopback port.
    pub fn fast_local() -> Self {
        Self {
            health_addr: "127.0.0.1:0".to_string(),
            poll_interval: Duration::from_millis(10),
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            health_shutdown_grace: Duration::from_millis(200),
            ..Self::default()
        }
    }

    /// Replace the proxy table.
    pub fn with_proxies(mut self, proxies: Vec<ProxySpec>) -> Self {
        self.proxies = proxies;
        self
    }

    /// Replace the store location.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the error threshold.
    pub fn with_max_error_count(mut self, max_error_count: u32) -> Self {
        self.max_error_count = max_error_count;
        self
    }

    /// Parsed health bind address.
    pub fn health_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.health_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidHealthAddr {
                addr: self.health_addr.clone(),
                reason: e.to_string(),
            })
    }

    /// Check the invariants the reconciler relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxies.is_empty() {
            return Err(ConfigError::NoProxies);
        }
        let mut seen = HashSet::new();
        for proxy in &self.proxies {
            if !seen.insert(proxy.name.as_str()) {
                return Err(ConfigError::DuplicateProxy(proxy.name.clone()));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.max_error_count == 0 {
            return Err(ConfigError::ZeroErrorCount);
        }
        self.health_socket_addr()?;
        Ok(())
    }
}
