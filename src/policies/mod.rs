//! Timing policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how registry poll sleeps evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid lockstep scans
//!
//! ## Quick wiring
//! ```text
//! ManagerConfig { poll: BackoffPolicy, .. }
//!      └─► ProcessRegistry::await_registration sleeps poll.next(n) between scans
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
