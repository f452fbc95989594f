//! Proxy and toxic values exchanged with the daemon.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the upstream timeout toxic.
pub const TOXIC_TIMEOUT_UP: &str = "toxic_timeout_up";

/// Name of the downstream timeout toxic.
pub const TOXIC_TIMEOUT_DOWN: &str = "toxic_timeout_down";

/// Every toxic name the controller installs or removes.
pub const TOXIC_NAMES: [&str; 2] = [TOXIC_TIMEOUT_UP, TOXIC_TIMEOUT_DOWN];

/// Toxic type that stalls a connection until it times out.
pub const TIMEOUT_TOXIC_TYPE: &str = "timeout";

/// A proxy as reported by the daemon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    /// Unique proxy name.
    pub name: String,

    /// Address the daemon listens on.
    pub listen: String,

    /// Address traffic is forwarded to.
    pub upstream: String,

    /// Whether the proxy accepts connections.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    /// Toxics active when the proxy was fetched.
    #[serde(default, skip_serializing)]
    pub toxics: Vec<Toxic>,
}

fn enabled_by_default() -> bool {
    true
}

impl Proxy {
    /// A fresh, enabled proxy without toxics.
    pub fn new(name: &str, listen: &str, upstream: &str) -> Self {
        Self {
            name: name.to_string(),
            listen: listen.to_string(),
            upstream: upstream.to_string(),
            enabled: true,
            toxics: Vec::new(),
        }
    }
}

/// Direction of traffic a toxic applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Client to upstream.
    Upstream,
    /// Upstream to client.
    Downstream,
}

/// A fault configured on a proxy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Toxic {
    /// Name, unique per proxy.
    pub name: String,

    /// Toxic type (`timeout`, `latency`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Affected direction.
    pub stream: Stream,

    /// Probability the toxic applies to a connection.
    #[serde(default = "full_toxicity")]
    pub toxicity: f32,

    /// Type-specific attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

fn full_toxicity() -> f32 {
    1.0
}

/// Which of the two timeout toxics to install.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToxicDirection {
    /// `toxic_timeout_up` on the upstream stream.
    Up,
    /// `toxic_timeout_down` on the downstream stream.
    Down,
}

impl ToxicDirection {
    /// Toxic name for this direction.
    pub fn name(self) -> &'static str {
        match self {
            ToxicDirection::Up => TOXIC_TIMEOUT_UP,
            ToxicDirection::Down => TOXIC_TIMEOUT_DOWN,
        }
    }

    /// Stream the toxic is attached to.
    pub fn stream(self) -> Stream {
        match self {
            ToxicDirection::Up => Stream::Upstream,
            ToxicDirection::Down => Stream::Downstream,
        }
    }

    /// Unconditional timeout toxic for this direction.
    pub fn timeout_toxic(self, timeout_ms: u64) -> Toxic {
        let mut attributes = BTreeMap::new();
        attributes.insert("timeout".to_string(), serde_json::Value::from(timeout_ms));
        Toxic {
            name: self.name().to_string(),
            kind: TIMEOUT_TOXIC_TYPE.to_string(),
            stream: self.stream(),
            toxicity: 1.0,
            attributes,
        }
    }
}
