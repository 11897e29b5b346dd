//! # Built-in subscribers
//!
//! - [`LogWriter`]: forwards events to `tracing` (feature `logging`).
//! - [`ProgressMonitor`]: keeps the latest progress snapshot for polling UIs.
//! - [`RunLogFile`]: writes each run's output and summary to `output/simulation_*.log`.

#[cfg(feature = "logging")]
mod log;
mod monitor;
mod run_log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use monitor::{ProgressMonitor, ProgressSnapshot};
pub use run_log::RunLogFile;
