//! # Poll schedule for registry discovery.
//!
//! [`BackoffPolicy`] controls how long `await_registration` sleeps between two
//! registry scans while a freshly spawned worker is starting up.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the first sleep;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the cap.
//!
//! The sleep for scan `n` is `first × factor^n`, clamped to `max`, then jittered.
//! The base is derived from `n` alone, so jitter never feeds back into later scans.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use daemonlink::{BackoffPolicy, JitterPolicy};
//!
//! let poll = BackoffPolicy {
//!     first: Duration::from_millis(20),
//!     max: Duration::from_millis(500),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(poll.next(0), Duration::from_millis(20));
//! assert_eq!(poll.next(1), Duration::from_millis(40));
//! assert_eq!(poll.next(10), Duration::from_millis(500));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Growing sleep schedule with a cap and optional jitter.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Sleep before the second scan.
    pub first: Duration,
    /// Upper bound for any single sleep.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization so many clients do not scan in lockstep.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a constant 100ms schedule capped at 30s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: JitterPolicy::None,
            factor: 1.0,
        }
    }
}

impl BackoffPolicy {
    /// Computes the sleep after scan `attempt` (0-indexed).
    ///
    /// Non-finite or negative intermediate values collapse to [`BackoffPolicy::max`].
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
