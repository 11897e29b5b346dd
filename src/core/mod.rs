//! Runtime core: from a [`RunRequest`] to a supervised solver process.
//!
//! Internal modules:
//! - [`config`]: runtime tuning (grace periods, queue sizes, buffer limits);
//! - [`request`]: what to run and where;
//! - [`launcher`]: command-line construction and spawn with merged output;
//! - [`process`]: the process handle seam and the terminate/kill sequence;
//! - [`reader`]: blocking line reader on its own thread;
//! - [`worker`]: one run, first line to `Finished`;
//! - [`supervisor`]: run slot, pre-flight, start/cancel, subscriber listener;
//! - [`builder`]: supervisor construction;
//! - [`shutdown`]: OS signals that cancel the active run.

mod builder;
mod config;
mod launcher;
mod process;
mod reader;
mod request;
mod shutdown;
mod supervisor;
mod worker;

pub use builder::SupervisorBuilder;
pub use config::Config;
pub use launcher::LaunchPlan;
pub use request::{DEFAULT_XML, DomainSpec, ParallelLaunch, RunRequest};
pub use shutdown::{ShutdownSignal, cancel_on_signal, wait_for_shutdown_signal};
pub use supervisor::{RunHandle, Supervisor};
pub use worker::RunReport;

pub(crate) use worker::panic_message;
