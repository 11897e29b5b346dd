//! # LogWriter: run events as log records
//!
//! A minimal subscriber that forwards every [`Event`] to `tracing`.
//! Solver output goes to target `simvisor::solver` so it can be filtered
//! separately from lifecycle records (`simvisor::run`).
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO simvisor::run: [started] run=run-1 pid=Some(4121) command="mpirun -np 4 /opt/complab CompLaB.xml"
//! INFO simvisor::solver: run=run-1 iT = 4200
//! INFO simvisor::run: [progress] run=run-1 iteration=4200 max=50000 eta=Some(61s)
//! WARN simvisor::run: [cancel-requested] run=run-1
//! INFO simvisor::run: [finished] run=run-1 outcome=cancelled summary="Cancelled after 0h 1m 2s"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind, RunOutcome};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter {
    quiet_solver: bool,
}

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip raw solver output; lifecycle and derived events are still logged.
    #[must_use]
    pub fn without_solver_output(mut self) -> Self {
        self.quiet_solver = true;
        self
    }
}

fn run_label(e: &Event) -> String {
    e.run.map(|r| r.to_string()).unwrap_or_else(|| "-".into())
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let run = run_label(e);
        match &e.kind {
            EventKind::Started { pid, command } => {
                info!(target: "simvisor::run", "[started] run={run} pid={pid:?} command={command:?}");
            }
            EventKind::OutputLine { line } => {
                if !self.quiet_solver {
                    info!(target: "simvisor::solver", "run={run} {line}");
                }
            }
            EventKind::Progress {
                iteration,
                max_iteration,
                eta,
                ..
            } => {
                debug!(target: "simvisor::run", "[progress] run={run} iteration={iteration} max={max_iteration} eta={eta:?}");
            }
            EventKind::Convergence {
                solver,
                iteration,
                residual,
            } => {
                debug!(target: "simvisor::run", "[convergence] run={run} solver={solver} iteration={iteration} residual={residual:e}");
            }
            EventKind::PhaseChanged { label } => {
                info!(target: "simvisor::run", "[phase] run={run} {label}");
            }
            EventKind::CancelRequested => {
                warn!(target: "simvisor::run", "[cancel-requested] run={run}");
            }
            EventKind::Diagnostic { report } => {
                warn!(target: "simvisor::run", "[diagnostic] run={run}\n{report}");
            }
            EventKind::Finished {
                outcome, summary, ..
            } => match outcome {
                RunOutcome::Succeeded | RunOutcome::Cancelled => {
                    info!(target: "simvisor::run", "[finished] run={run} outcome={} summary={summary:?}", outcome.as_label());
                }
                _ => {
                    error!(target: "simvisor::run", "[finished] run={run} outcome={} summary={summary:?}", outcome.as_label());
                }
            },
            EventKind::SubscriberOverflow {
                subscriber,
                dropped,
            } => {
                warn!(target: "simvisor::run", "[subscriber-overflow] subscriber={subscriber} dropped={dropped}");
            }
            EventKind::SubscriberPanicked { subscriber, info } => {
                error!(target: "simvisor::run", "[subscriber-panicked] subscriber={subscriber} info={info}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
