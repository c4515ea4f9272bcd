//! # Jitter for poll sleeps.
//!
//! [`JitterPolicy`] randomizes sleeps so that many clients waiting on the same
//! registry do not scan it in lockstep.
//!
//! - [`JitterPolicy::None`] exact sleeps
//! - [`JitterPolicy::Full`] random in `[0, d]`
//! - [`JitterPolicy::Equal`] `d/2 + random[0, d/2]`
//! - [`JitterPolicy::Decorrelated`] random in `[base, prev * 3]`, capped

use std::time::Duration;

use rand::Rng;

/// Randomization strategy applied on top of a [`BackoffPolicy`](crate::BackoffPolicy).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter.
    #[default]
    None,
    /// Random delay in `[0, d]`.
    Full,
    /// `d/2 + random[0, d/2]`.
    Equal,
    /// Random delay in `[base, prev * 3]`, capped at max.
    ///
    /// Needs context; see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns the input unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full(delay),
            JitterPolicy::Equal => equal(delay),
        }
    }

    /// Applies decorrelated jitter given the floor, the previous sleep and the cap.
    ///
    /// Other policies fall back to `apply(prev)`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn full(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let extra = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    Duration::from_millis(half + extra)
}
