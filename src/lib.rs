//! # simvisor
//!
//! **simvisor** supervises runs of the CompLaB3D reactive-transport solver: it
//! checks a project before launch, starts the solver (directly or through an
//! MPI launcher), turns its console output into typed progress events,
//! cancels it on request and explains failures.
//!
//! ## Architecture
//! ```text
//!            RunRequest
//!                │
//!                ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                    │
//! │  - run slot (one active run)                                   │
//! │  - pre-flight: executable, project dir, CompLaB.xml, geometry  │
//! │  - launcher: <exe> <xml> | <mpi> -np N <exe> <xml>             │
//! └───────┬────────────────────────────────────────────────────────┘
//!         │ spawn
//!         ▼
//!  solver process ── stdout+stderr (one pipe) ──► reader thread
//!                                                      │ lines
//!                                                      ▼
//!                                       ┌──────────────────────────────┐
//!                                       │  RunWorker                   │
//!                                       │  - OutputParser (rule chain) │
//!                                       │  - bounded output buffer     │
//!                                       │  - cancel: TERM → KILL       │
//!                                       │  - failure: DiagnosticReport │
//!                                       └──────────────┬───────────────┘
//!                                                      │ deliver (waits when subscribers lag)
//!                                                      ▼
//!                                   Bus (lossless feed) ──► listener ──► SubscriberSet
//!                                                                   ┌──────┼──────────┐
//!                                                                   ▼      ▼          ▼
//!                                                            LogWriter ProgressMonitor RunLogFile
//! ```
//!
//! ### Run lifecycle (events)
//! ```text
//! [Diagnostic]* ─► Started ─► (OutputLine ─► [Progress|Convergence|PhaseChanged]*)*
//!                                 ─► [CancelRequested] ─► [Diagnostic] ─► Finished
//! ```
//! A run refused by pre-flight or a failed launch goes straight from its
//! diagnostics to `Finished(NotStarted)`; no `OutputLine` is ever published.
//!
//! ## Features
//! | Area            | Description                                              | Key types                                        |
//! |-----------------|----------------------------------------------------------|--------------------------------------------------|
//! | **Supervision** | Start, cancel, wait for one solver run at a time.        | [`Supervisor`], [`RunHandle`], [`RunReport`]     |
//! | **Events**      | Typed stream of everything that happens during a run.    | [`Event`], [`EventKind`], [`RunOutcome`]         |
//! | **Parsing**     | Iteration, residual and phase extraction from output.    | [`parse::OutputParser`], [`parse::Rule`]         |
//! | **Diagnosis**   | Exit-code classification and evidence from output.       | [`diagnose::DiagnosticReport`]                   |
//! | **Pre-flight**  | Attributable failures before any process exists.         | [`preflight::run_preflight`], [`preflight::Validate`] |
//! | **Subscribers** | Logging, progress polling, per-run log files.            | [`Subscribe`], [`ProgressMonitor`], [`RunLogFile`] |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`].
//! - `cli`: builds the `simvisor` binary.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use simvisor::{Config, ProgressMonitor, RunRequest, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = Arc::new(ProgressMonitor::new());
//!     let sup = Supervisor::builder(Config::default())
//!         .with_subscribers(vec![monitor.clone() as Arc<dyn Subscribe>])
//!         .build();
//!
//!     let req = RunRequest::new("/opt/complab/complab", "/home/me/projects/column")
//!         .with_parallel("mpirun", 4);
//!     let run = sup.start(req).await?;
//!
//!     let report = run.wait().await;
//!     println!("{}", report.summary);
//!     if let Some(diag) = &report.diagnostic {
//!         println!("{diag}");
//!     }
//!     sup.close().await;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod subscribers;

pub mod diagnose;
pub mod locate;
pub mod parse;
pub mod preflight;

// ---- Public re-exports ----

pub use core::{
    Config, DEFAULT_XML, DomainSpec, LaunchPlan, ParallelLaunch, RunHandle, RunReport, RunRequest,
    ShutdownSignal, Supervisor, SupervisorBuilder, cancel_on_signal, wait_for_shutdown_signal,
};
pub use error::RunError;
pub use events::{Bus, Event, EventKind, RunId, RunOutcome, Solver};
pub use subscribers::{ProgressMonitor, ProgressSnapshot, RunLogFile, Subscribe, SubscriberSet};

// Optional: built-in `tracing` subscriber.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
