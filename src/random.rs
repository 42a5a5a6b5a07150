//! Deterministic pseudo-random stream.
//!
//! Grounded in the teacher's `HermeticRng` (`backtest_v2/hermetic.rs`): a
//! `ChaCha8Rng` seeded once at construction and never reseeded mid-run, so
//! parallel runs can each own an independent, bit-reproducible stream. The
//! per-round consumption order (disturbance draw, then forecast noise) is
//! the caller's responsibility to preserve — this type only guarantees that
//! calls are served in the order they are made.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub struct RandomStream {
    rng: ChaCha8Rng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Standard normal draw scaled to `N(mean, std)`, via Box-Muller.
    pub fn next_gauss(&mut self, mean: f64, std: f64) -> f64 {
        if std <= 0.0 {
            return mean;
        }
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen::<f64>();
        let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std * z0
    }

    /// Uniform integer draw in `[low, high]` inclusive.
    pub fn next_int(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Pick an index proportional to the given non-negative weights.
    /// Falls back to index 0 if all weights are zero or the slice is empty.
    pub fn weighted_choice(&mut self, weights: &[f64]) -> usize {
        if weights.is_empty() {
            return 0;
        }
        match WeightedIndex::new(weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => 0,
        }
    }
}
