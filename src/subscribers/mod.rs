//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in subscribers.
//!
//! ## Architecture
//! ```text
//! RunWorker ── deliver(Event) ──► Bus feed ──► listener (in Supervisor)
//!                                                  │
//!                                                  ▼
//!                                          SubscriberSet::deliver
//!                                   ┌──────────┼──────────────┐
//!                                   ▼          ▼              ▼
//!                               LogWriter  ProgressMonitor  RunLogFile  ...
//! ```
//!
//! ## Subscriber types
//! - **Passive**: react to events (logging, log files, alerts)
//! - **Stateful**: keep a view that others poll ([`ProgressMonitor`])

mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use embedded::{ProgressMonitor, ProgressSnapshot, RunLogFile};
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
