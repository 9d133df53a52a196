//! Exponential backoff with randomized jitter.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use exportcheck_config::RetryConfig;

#[derive(Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    rng: SmallRng,
}

impl ExponentialBackoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_rng(config, SmallRng::from_rng(&mut rand::rng()))
    }

    pub fn seeded(config: &RetryConfig, seed: u64) -> Self {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: &RetryConfig, rng: SmallRng) -> Self {
        Self {
            current: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor.clamp(0.0, 1.0),
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_elapsed: Duration::from_millis(config.max_elapsed_ms),
            rng,
        }
    }

    /// Delay before the next attempt, or `None` once `elapsed` has used up
    /// the retry budget.
    pub fn next_delay(&mut self, elapsed: Duration) -> Option<Duration> {
        if elapsed >= self.max_elapsed {
            return None;
        }

        let base = self.current.as_secs_f64();
        let delta = base * self.randomization_factor;
        let delay = if delta > 0.0 {
            self.rng.random_range((base - delta)..=(base + delta))
        } else {
            base
        };

        self.current = self.current.mul_f64(self.multiplier).min(self.max_interval);
        Some(Duration::from_secs_f64(delay).min(self.max_elapsed - elapsed))
    }
}
