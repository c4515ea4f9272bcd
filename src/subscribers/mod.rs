//! # Event subscribers for the connection manager.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! (with the `logging` feature) the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! ConnectionManager ── publish(Event) ──► Bus ──► event listener ──► SubscriberSet
//!                                                                        │
//!                                                           ┌────────────┼────────────┐
//!                                                           ▼            ▼            ▼
//!                                                       LogWriter     Metrics      Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
