//! Run events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`RunOutcome`] event payloads and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (pre-flight diagnostics, `Started`, launch
//!   failures), `RunWorker` (stream events, `Diagnostic`, `Finished`),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's listener (fans out to `SubscriberSet`) and
//!   any receiver obtained from `Supervisor::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, RunId, RunOutcome, Solver};
