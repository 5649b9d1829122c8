//! # Event subscribers for the protovisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`] for handling runtime events broadcast through
//! the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ProtocolInstance ── publish(Event) ──► Bus ──► Daemon listener ──► SubscriberSet
//!                                                                        │
//!                                                           ┌────────────┼──────────┐
//!                                                           ▼            ▼          ▼
//!                                                       LogWriter     Metrics     Custom
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
