//! Task execution pools.
//!
//! - [`ExecutorFactory`] hands out named [`Pool`]s and stops them all at once
//! - [`Pool`] a tracked set of tasks, bounded or unbounded ([`Sizing`])
//! - [`StopPolicy`] whether `stop` cancels or drains in-flight tasks
//!
//! ```text
//! ExecutorFactory ──get_or_create("actors")──► Pool ──spawn──► tokio tasks
//!        │
//!        └── stop_all() ── join_all(pool.stop(grace)) ──► stuck pool names
//! ```

mod factory;
mod pool;

pub use factory::ExecutorFactory;
pub use pool::{Pool, Sizing, StopPolicy};
