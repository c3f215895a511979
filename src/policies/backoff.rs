//! # Backoff policy for retrying rejected batches.
//!
//! [`BackoffPolicy`] controls how long a publisher waits after its sink
//! accepted nothing. It is parameterized by:
//! - [`BackoffPolicy::floor`] the first (and minimum) delay;
//! - [`BackoffPolicy::delta`] the growth unit;
//! - [`BackoffPolicy::ceiling`] the maximum delay cap;
//! - [`BackoffPolicy::jitter`] the relative spread applied to `delta`.
//!
//! The delay after `n` consecutive failures is
//! `floor + (2^n - 1) × delta × (1 ± jitter)`, clamped to `ceiling`.
//! Jitter is capped at one third, which keeps consecutive delays
//! non-decreasing whatever the random draws are.
//!
//! Randomness comes from a [`BackoffState`] owned by one publisher, so tests
//! can seed it and two sinks never share a generator.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tracevisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy {
//!     floor: Duration::from_secs(1),
//!     delta: Duration::from_secs(2),
//!     ceiling: Duration::from_secs(60),
//!     jitter: 0.0,
//! };
//!
//! assert_eq!(backoff.delay(0, 0.5), Duration::from_secs(1));
//! assert_eq!(backoff.delay(1, 0.5), Duration::from_secs(3));
//! assert_eq!(backoff.delay(2, 0.5), Duration::from_secs(7));
//! assert_eq!(backoff.delay(10, 0.5), Duration::from_secs(60));
//! ```

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Largest jitter for which delays stay monotonic.
const MAX_JITTER: f64 = 1.0 / 3.0;

/// Exponent cap; `2^63` already exceeds any sane ceiling.
const MAX_EXPONENT: u32 = 63;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first rejected batch.
    pub floor: Duration,
    /// Growth unit multiplied by `2^n - 1`.
    pub delta: Duration,
    /// Maximum delay.
    pub ceiling: Duration,
    /// Relative spread of `delta` (`0.2` = ±20 %), capped at one third.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `floor = 45s`;
    /// - `delta = 30s`;
    /// - `ceiling = 1h`;
    /// - `jitter = 0.2`.
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(45),
            delta: Duration::from_secs(30),
            ceiling: Duration::from_secs(3600),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay after `attempt` consecutive failures (0-indexed).
    ///
    /// `sample` is a uniform draw in `[0, 1]`; `0.5` means "no jitter".
    pub fn delay(&self, attempt: u32, sample: f64) -> Duration {
        let jitter = self.jitter.clamp(0.0, MAX_JITTER);
        let spread = 1.0 + jitter * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        let growth = 2f64.powi(attempt.min(MAX_EXPONENT) as i32) - 1.0;

        let ceiling = self.ceiling.max(self.floor);
        let secs = self.floor.as_secs_f64() + growth * self.delta.as_secs_f64() * spread;

        if !secs.is_finite() || secs >= ceiling.as_secs_f64() {
            ceiling
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Attempt counter and random source of one publisher.
#[derive(Debug)]
pub struct BackoffState {
    policy: BackoffPolicy,
    attempt: u32,
    rng: StdRng,
}

impl BackoffState {
    /// Creates a state seeded from the thread-local generator.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_rng(&mut rand::rng()))
    }

    /// Creates a state with an explicit random source.
    pub fn with_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        Self {
            policy,
            attempt: 0,
            rng,
        }
    }

    /// Returns the next delay and advances the attempt counter.
    pub fn next(&mut self) -> Duration {
        let sample: f64 = self.rng.random();
        let delay = self.policy.delay(self.attempt, sample);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Resets to the floor after a fully accepted batch.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
