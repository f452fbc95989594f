//! Provider traits and the bundle the reconciler is generic over.
//!
//! ```text
//! struct Reconciler<S, D, P: Providers>
//! ```
//!
//! instead of carrying separate time and random type parameters.

mod random;
mod time;

pub use random::{ChaChaRandomProvider, RandomProvider};
pub use time::{TimeProvider, TokioTimeProvider};

/// Bundle of the provider types used by the controller.
pub trait Providers: Clone + 'static {
    /// Time provider type for sleep, timeout, and time queries.
    type Time: TimeProvider + Clone + 'static;

    /// Random provider type for deterministic or real randomness.
    type Random: RandomProvider + Clone + 'static;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the random provider instance.
    fn random(&self) -> &Self::Random;
}

/// Production providers using the Tokio clock and a ChaCha generator.
#[derive(Clone, Debug)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    random: ChaChaRandomProvider,
}

impl TokioProviders {
    /// Create providers with an entropy-seeded generator.
    pub fn new() -> Self {
        Self {
            time: TokioTimeProvider::new(),
            random: ChaChaRandomProvider::from_entropy(),
        }
    }

    /// Create providers whose random stream is fixed by `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            time: TokioTimeProvider::new(),
            random: ChaChaRandomProvider::seeded(seed),
        }
    }
}

impl Default for TokioProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Random = ChaChaRandomProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}
