//! Jitter for retry delays.
//!
//! Many clients retrying a struggling instance on the same schedule arrive
//! together; randomizing each delay spreads them out. `Full` is the default
//! and a good general choice; `Equal` keeps a floor of half the delay;
//! `None` is for tests and tightly controlled schedules.
//!
//! Delays are quantized to milliseconds for the random draw; conversions
//! saturate rather than panic on very large durations.

use rand::{rng, Rng};
use std::time::Duration;

/// Randomization applied to backoff delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Use the exact backoff delay.
    None,
    /// Uniform in `[0, delay]`.
    #[default]
    Full,
    /// Uniform in `[delay / 2, delay]`.
    Equal,
}

impl Jitter {
    /// Apply jitter using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Apply jitter with an injected RNG (deterministic tests).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis: u64 = delay.as_millis().try_into().unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                if millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rng.random_range(0..=millis))
                }
            }
            Jitter::Equal => {
                if millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rng.random_range(millis / 2..=millis))
                }
            }
        }
    }
}
