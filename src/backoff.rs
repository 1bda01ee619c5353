//! Backoff strategies for the delay between attempts.
//!
//! Attempt semantics follow the dispatch loop: `delay(0)` is the initial
//! call and yields zero; the delay before retry `n` is `delay(n)`. All
//! arithmetic saturates at [`MAX_BACKOFF`] instead of overflowing.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use waypoint::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(6), Duration::from_secs(2)); // capped
//! ```

use std::time::Duration;

/// Ceiling applied when a computed delay would overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Invalid backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    /// A cap only makes sense for growing strategies.
    #[error("a cap is only valid for linear or exponential backoff")]
    CapNotSupported,
    #[error("cap must be greater than zero")]
    CapMustBePositive,
    #[error("cap ({max:?}) must be at least the base delay ({base:?})")]
    CapBelowBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Constant { delay: Duration },
    Linear { base: Duration, max: Option<Duration> },
    Exponential { base: Duration, max: Option<Duration> },
}

/// Delay strategy consulted between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    kind: Kind,
}

impl Backoff {
    /// The same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: Kind::Constant { delay } }
    }

    /// `base * attempt`, optionally capped.
    pub fn linear(base: Duration) -> Self {
        Self { kind: Kind::Linear { base, max: None } }
    }

    /// `base * 2^(attempt - 1)`, optionally capped.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: Kind::Exponential { base, max: None } }
    }

    /// Cap the delay of a linear or exponential strategy.
    ///
    /// Errors on `Constant`, on a zero cap, and on a cap below the base.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::CapMustBePositive);
        }
        match &mut self.kind {
            Kind::Constant { .. } => Err(BackoffError::CapNotSupported),
            Kind::Linear { base, max: cap } | Kind::Exponential { base, max: cap } => {
                if max < *base {
                    return Err(BackoffError::CapBelowBase { base: *base, max });
                }
                *cap = Some(max);
                Ok(self)
            }
        }
    }

    /// The delay before the given attempt (0-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay = match &self.kind {
            Kind::Constant { delay } => *delay,
            Kind::Linear { base, max } => {
                // clamp before the u32 conversion so huge attempts saturate
                let steps = attempt.min(u32::MAX as usize) as u32;
                apply_cap(base.checked_mul(steps).unwrap_or(MAX_BACKOFF), *max)
            }
            Kind::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
                let nanos = base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                let uncapped = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                apply_cap(uncapped, *max)
            }
        };
        delay.min(MAX_BACKOFF)
    }
}

fn apply_cap(delay: Duration, max: Option<Duration>) -> Duration {
    match max {
        Some(max) => delay.min(max),
        None => delay,
    }
}
