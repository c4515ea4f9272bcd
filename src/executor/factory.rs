use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;

use super::pool::{Pool, Sizing, StopPolicy};
use crate::error::{PoolError, StopError};
use crate::teardown::Stoppable;

/// Hands out named pools and stops them together.
///
/// A name maps to one pool for the factory's lifetime; the sizing and policy
/// passed on later calls are ignored.
pub struct ExecutorFactory {
    grace: Duration,
    pools: Mutex<HashMap<String, Pool>>,
    stopped: AtomicBool,
}

impl ExecutorFactory {
    /// Creates a factory whose pools get `grace` each to stop.
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            pools: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Grace given to each pool on stop.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Returns the pool named `name`, creating it with [`StopPolicy::Cancel`].
    pub fn get_or_create(&self, name: &str, sizing: Sizing) -> Result<Pool, PoolError> {
        self.get_or_create_with(name, sizing, StopPolicy::Cancel)
    }

    /// Returns the pool named `name`, creating it with the given policy.
    ///
    /// Fails with [`PoolError::Stopped`] after [`stop_all`](Self::stop_all).
    pub fn get_or_create_with(
        &self,
        name: &str,
        sizing: Sizing,
        policy: StopPolicy,
    ) -> Result<Pool, PoolError> {
        let mut pools = self.pools.lock();
        if self.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped {
                pool: name.to_string(),
            });
        }
        let pool = pools
            .entry(name.to_string())
            .or_insert_with(|| Pool::new(name, sizing, policy));
        Ok(pool.clone())
    }

    /// Names of the pools created so far.
    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// True once `stop_all` was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stops every pool in parallel and returns the names of the ones that
    /// did not finish within the grace.
    pub async fn stop_all(&self) -> Vec<String> {
        let pools: Vec<Pool> = {
            let pools = self.pools.lock();
            self.stopped.store(true, Ordering::Release);
            pools.values().cloned().collect()
        };

        let grace = self.grace;
        let results = join_all(pools.iter().map(|p| p.stop(grace))).await;

        let mut stuck: Vec<String> = pools
            .iter()
            .zip(results)
            .filter(|(_, finished)| !finished)
            .map(|(p, _)| p.name().to_string())
            .collect();
        stuck.sort();
        stuck
    }
}

#[async_trait]
impl Stoppable for ExecutorFactory {
    fn name(&self) -> &str {
        "executor"
    }

    async fn stop(&self) -> Result<(), StopError> {
        let stuck = self.stop_all().await;
        if stuck.is_empty() {
            Ok(())
        } else {
            Err(StopError::GraceExceeded {
                grace: self.grace,
                stuck,
            })
        }
    }
}
