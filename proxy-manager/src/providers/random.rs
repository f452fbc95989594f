//! Random number generation provider abstraction.
//!
//! Toxic direction is picked with a fair coin. The provider pattern keeps that
//! coin seedable so tests can pin the sequence of upstream/downstream choices.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::rc::Rc;

/// Provider trait for random number generation.
pub trait RandomProvider: Clone {
    /// Generate a random f64 between 0.0 and 1.0.
    fn random_ratio(&self) -> f64;

    /// Generate a random bool with the given probability of being true.
    ///
    /// The probability should be between 0.0 and 1.0.
    fn random_bool(&self, probability: f64) -> bool {
        self.random_ratio() < probability
    }
}

/// ChaCha8-backed random provider.
///
/// Clones share the same generator, so a seeded provider handed to several
/// components still yields one deterministic stream.
///
/// # Example
///
/// ```rust
/// use proxy_manager::providers::{ChaChaRandomProvider, RandomProvider};
///
/// let a = ChaChaRandomProvider::seeded(7);
/// let b = ChaChaRandomProvider::seeded(7);
/// assert_eq!(a.random_ratio(), b.random_ratio());
/// ```
#[derive(Clone, Debug)]
pub struct ChaChaRandomProvider {
    rng: Rc<RefCell<ChaCha8Rng>>,
}

impl ChaChaRandomProvider {
    /// Create a provider seeded from the thread-local entropy source.
    pub fn from_entropy() -> Self {
        let seed: u64 = rand::rng().random();
        Self::seeded(seed)
    }

    /// Create a provider with a fixed seed for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }
}

impl Default for ChaChaRandomProvider {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomProvider for ChaChaRandomProvider {
    fn random_ratio(&self) -> f64 {
        self.rng.borrow_mut().random()
    }
}
