//! # Ordered, failure-tolerant resource shutdown.
//!
//! [`stop_all`] stops a list of [`Stoppable`] resources one after another.
//! A failing (or panicking) resource never prevents the next one from being
//! stopped; every failure is collected into a single [`TeardownError`].
//!
//! ```text
//! stop_all([actors, executor, events])
//!   ├─► actors.stop()    Ok
//!   ├─► executor.stop()  Err(GraceExceeded) ─┐
//!   └─► events.stop()    panic ──────────────┤ recorded, teardown continues
//!                                            ▼
//!                  Err(TeardownError { failures: [executor, events] })
//! ```
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use daemonlink::{StopError, Stoppable, teardown};
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Stoppable for Noop {
//!     fn name(&self) -> &str { "noop" }
//!     async fn stop(&self) -> Result<(), StopError> { Ok(()) }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (a, b) = (Noop, Noop);
//! assert!(teardown::stop_all(&[&a, &b]).await.is_ok());
//! # }
//! ```

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;

use crate::error::{StopError, StopFailure, TeardownError};
use crate::subscribers::panic_message;

/// A resource with an explicit asynchronous stop.
///
/// Implementations should be idempotent: a second `stop` after a successful
/// one returns `Ok(())`.
#[async_trait]
pub trait Stoppable: Send + Sync {
    /// Name reported in [`StopFailure::resource`].
    fn name(&self) -> &str;

    /// Stops the resource, releasing everything it holds.
    async fn stop(&self) -> Result<(), StopError>;
}

/// Stops every resource in order and aggregates failures.
///
/// Returns `Ok(())` only if every resource stopped cleanly.
pub async fn stop_all(resources: &[&dyn Stoppable]) -> Result<(), TeardownError> {
    let mut failures = Vec::new();

    for resource in resources {
        let outcome = AssertUnwindSafe(resource.stop()).catch_unwind().await;
        let error = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(payload) => StopError::Panicked {
                info: panic_message(&*payload),
            },
        };
        failures.push(StopFailure {
            resource: resource.name().to_string(),
            error,
        });
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TeardownError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Outcome {
        Clean,
        Fail,
        Panic,
    }

    struct Probe {
        name: String,
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl Probe {
        fn new(name: &str, outcome: Outcome) -> Self {
            Self {
                name: name.to_string(),
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Stoppable for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn stop(&self) -> Result<(), StopError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Clean => Ok(()),
                Outcome::Fail => Err(StopError::Failed {
                    reason: format!("{} refused", self.name),
                }),
                Outcome::Panic => panic!("{} exploded", self.name),
            }
        }
    }

    #[tokio::test]
    async fn empty_list_is_ok() {
        assert!(stop_all(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn all_clean_is_ok() {
        let a = Probe::new("a", Outcome::Clean);
        let b = Probe::new("b", Outcome::Clean);
        assert!(stop_all(&[&a, &b]).await.is_ok());
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_resource_is_attempted_and_only_failures_are_reported() {
        let probes = [
            Probe::new("r0", Outcome::Clean),
            Probe::new("r1", Outcome::Fail),
            Probe::new("r2", Outcome::Clean),
            Probe::new("r3", Outcome::Panic),
            Probe::new("r4", Outcome::Fail),
            Probe::new("r5", Outcome::Clean),
        ];
        let refs: Vec<&dyn Stoppable> = probes.iter().map(|p| p as &dyn Stoppable).collect();

        let err = stop_all(&refs).await.unwrap_err();

        for p in &probes {
            assert_eq!(p.calls.load(Ordering::SeqCst), 1, "{} not attempted", p.name);
        }
        assert_eq!(err.failures.len(), 3);
        assert_eq!(err.resources(), vec!["r1", "r3", "r4"]);
        assert_eq!(
            err.failures[1].error,
            StopError::Panicked {
                info: "r3 exploded".into()
            }
        );
    }
}
