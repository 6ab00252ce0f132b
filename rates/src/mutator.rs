//! Per-tick rate mutation.

use fxstream_common::CurrencyCode;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Computes the next value of one rate during a tick.
///
/// Implementations must return a strictly positive, finite value. The store
/// keeps the previous value for any code where they do not.
pub trait RateMutator: Send + Sync {
    /// Compute the new rate for `code` given its current value.
    fn mutate(&self, code: &CurrencyCode, current: f64) -> f64;
}

impl<F> RateMutator for F
where
    F: Fn(&CurrencyCode, f64) -> f64 + Send + Sync,
{
    fn mutate(&self, code: &CurrencyCode, current: f64) -> f64 {
        self(code, current)
    }
}

/// Moves every rate up or down by a random fraction in `[0, max_change)`.
pub struct RandomWalkMutator {
    max_change: f64,
    rng: Mutex<StdRng>,
}

impl RandomWalkMutator {
    /// Create a mutator seeded from the operating system.
    pub fn new(max_change: f64) -> Self {
        Self {
            max_change,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a mutator with a fixed seed for reproducible runs.
    pub fn seeded(max_change: f64, seed: u64) -> Self {
        Self {
            max_change,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Get the largest fractional step.
    pub fn max_change(&self) -> f64 {
        self.max_change
    }
}

impl RateMutator for RandomWalkMutator {
    fn mutate(&self, code: &CurrencyCode, current: f64) -> f64 {
        if code.is_reference() || self.max_change <= 0.0 {
            return current;
        }

        let mut rng = self.rng.lock();
        let change = rng.gen_range(0.0..self.max_change);

        if rng.gen_bool(0.5) {
            current * (1.0 + change)
        } else {
            current * (1.0 - change)
        }
    }
}
