//! # Named task pool.
//!
//! A [`Pool`] runs futures on the tokio runtime and keeps track of them so it
//! can be stopped as a unit. Bounded pools cap concurrency with a semaphore.
//! Under [`StopPolicy::Cancel`] tasks still waiting for a permit never start.
//!
//! ```text
//! spawn(fut) ──► JoinSet ──► [acquire permit] ──► fut
//!                   │                               ▲
//! stop(grace) ──────┘ close set, cancel token ──────┘ (StopPolicy::Cancel)
//!                     wait up to grace, abort the rest
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;

/// Concurrency limit of a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sizing {
    /// No limit.
    Unbounded,
    /// At most `n` tasks run at once (`0` is treated as `1`).
    Bounded(usize),
}

/// What `stop` does with tasks still running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopPolicy {
    /// Cancel in-flight tasks at their next await point.
    #[default]
    Cancel,
    /// Let in-flight tasks finish within the grace period.
    Drain,
}

struct PoolInner {
    name: String,
    policy: StopPolicy,
    permits: Option<Arc<Semaphore>>,
    token: CancellationToken,
    /// `None` once the pool is stopped.
    tasks: Mutex<Option<JoinSet<()>>>,
}

/// Handle to a named pool. Cloning is cheap; all clones share the same tasks.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    pub(crate) fn new(name: impl Into<String>, sizing: Sizing, policy: StopPolicy) -> Self {
        let permits = match sizing {
            Sizing::Unbounded => None,
            Sizing::Bounded(n) => Some(Arc::new(Semaphore::new(n.max(1)))),
        };
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                policy,
                permits,
                token: CancellationToken::new(),
                tasks: Mutex::new(Some(JoinSet::new())),
            }),
        }
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stop policy chosen at creation.
    pub fn policy(&self) -> StopPolicy {
        self.inner.policy
    }

    /// True once `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.inner.tasks.lock().is_none()
    }

    /// Number of tasks not yet finished.
    pub fn active(&self) -> usize {
        let mut guard = self.inner.tasks.lock();
        match guard.as_mut() {
            Some(set) => {
                while set.try_join_next().is_some() {}
                set.len()
            }
            None => 0,
        }
    }

    /// Submits a future.
    ///
    /// Fails with [`PoolError::Stopped`] once the pool has been stopped; the
    /// future is dropped without being polled.
    pub fn spawn<F>(&self, fut: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.inner.tasks.lock();
        let Some(set) = guard.as_mut() else {
            return Err(PoolError::Stopped {
                pool: self.inner.name.clone(),
            });
        };
        while set.try_join_next().is_some() {}

        let permits = self.inner.permits.clone();
        let token = self.inner.token.clone();
        let cancel_in_flight = self.inner.policy == StopPolicy::Cancel;

        set.spawn(async move {
            let _permit = match permits {
                Some(sem) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    res = sem.acquire_owned() => match res {
                        Ok(permit) => Some(permit),
                        Err(_closed) => return,
                    },
                },
                None => None,
            };

            if cancel_in_flight {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = fut => {}
                }
            } else {
                fut.await;
            }
        });
        Ok(())
    }

    /// Stops the pool and waits up to `grace` for its tasks.
    ///
    /// Returns `true` if every task finished in time. Tasks still running
    /// after the grace are aborted. Calling `stop` again returns `true`.
    pub async fn stop(&self, grace: Duration) -> bool {
        let Some(mut set) = self.inner.tasks.lock().take() else {
            return true;
        };
        if self.inner.policy == StopPolicy::Cancel {
            self.inner.token.cancel();
        }

        let done = async { while set.join_next().await.is_some() {} };
        let finished = tokio::time::timeout(grace, done).await.is_ok();

        if !finished {
            self.inner.token.cancel();
            set.abort_all();
        }
        finished
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.policy)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_submitted_work() {
        let pool = Pool::new("io", Sizing::Unbounded, StopPolicy::Drain);
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(7);
        })
        .unwrap();
        assert_eq!(rx.await.unwrap(), 7);
        assert!(pool.stop(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn rejects_work_after_stop() {
        let pool = Pool::new("io", Sizing::Unbounded, StopPolicy::Cancel);
        assert!(pool.stop(Duration::from_millis(10)).await);
        assert!(pool.is_stopped());
        assert_eq!(
            pool.spawn(async {}),
            Err(PoolError::Stopped { pool: "io".into() })
        );
        assert!(pool.stop(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn bounded_pool_caps_concurrency() {
        let pool = Pool::new("cpu", Sizing::Bounded(2), StopPolicy::Drain);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.stop(Duration::from_secs(5)).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancel_policy_interrupts_in_flight_tasks() {
        let pool = Pool::new("io", Sizing::Unbounded, StopPolicy::Cancel);
        pool.spawn(std::future::pending()).unwrap();
        assert!(pool.stop(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn drain_policy_reports_stuck_tasks() {
        let pool = Pool::new("io", Sizing::Unbounded, StopPolicy::Drain);
        pool.spawn(std::future::pending()).unwrap();
        assert!(!pool.stop(Duration::from_millis(20)).await);
    }
}
