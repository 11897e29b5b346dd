//! # Run events emitted by the supervisor and the run worker.
//!
//! [`EventKind`] is a tagged union covering three groups:
//! - **Stream events**: derived from the solver's merged stdout/stderr
//!   (`OutputLine`, `Progress`, `Convergence`, `PhaseChanged`)
//! - **Lifecycle events**: `Started`, `CancelRequested`, `Diagnostic`, `Finished`
//! - **Subscriber events**: fan-out problems (`SubscriberOverflow`, `SubscriberPanicked`)
//!
//! The [`Event`] struct wraps a kind with a sequence number, a wall-clock
//! timestamp and the id of the run it belongs to.
//!
//! ## Ordering guarantees
//! - `seq` is globally unique and increases monotonically.
//! - For one run, `OutputLine` events follow the byte order of the child's output;
//!   events derived from a line are published right after that line's `OutputLine`.
//! - `Finished` is the last event of a run and is published exactly once.
//!
//! ## Example
//! ```rust
//! use simvisor::{Event, EventKind, RunId, Solver};
//!
//! let ev = Event::now(
//!     RunId::new(1),
//!     EventKind::Convergence { solver: Solver::Ns, iteration: 4200, residual: 1.2e-7 },
//! );
//! assert_eq!(ev.kind.as_label(), "convergence");
//! assert_eq!(ev.run, Some(RunId::new(1)));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identifier of one supervised run (unique per supervisor instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    /// Wraps a raw run number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw run number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Solver phase that reported a convergence sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Solver {
    /// Navier-Stokes (flow) solver.
    Ns,
    /// Advection-diffusion (transport) solver.
    Ade,
}

impl Solver {
    /// Returns the name used in the solver's own log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Ns => "NS",
            Solver::Ade => "ADE",
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a run, carried by [`EventKind::Finished`].
///
/// `Cancelled` never maps to an exit code: after a forced kill the code is
/// platform-dependent and meaningless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The solver exited with code 0.
    Succeeded,
    /// The solver exited with a non-zero code (or was killed by a signal,
    /// reported as `-signal`).
    Failed {
        /// Raw exit code as reported by the OS.
        exit_code: i64,
    },
    /// The run was cancelled by the caller.
    Cancelled,
    /// The process was never started (pre-flight or launch failure).
    NotStarted {
        /// Stable label of the [`RunError`](crate::RunError) that stopped the run.
        label: &'static str,
        /// Human-readable reason.
        message: Arc<str>,
    },
    /// The supervisor itself failed while the process was running
    /// (output stream error or an internal panic).
    Aborted {
        /// Human-readable reason.
        reason: Arc<str>,
    },
}

impl RunOutcome {
    /// Returns the solver exit code, if the solver exited on its own.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            RunOutcome::Succeeded => Some(0),
            RunOutcome::Failed { exit_code } => Some(*exit_code),
            _ => None,
        }
    }

    /// True for [`RunOutcome::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    /// True for [`RunOutcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }

    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::NotStarted { .. } => "not_started",
            RunOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// Classification and payload of a run event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    // === Lifecycle ===
    /// The solver process is running.
    Started {
        /// OS process id, if the platform reports one.
        pid: Option<u32>,
        /// Command line as launched (for display only).
        command: Arc<str>,
    },

    /// Cancellation was observed by the run worker; termination follows.
    CancelRequested,

    /// Human-readable diagnostic: one pre-flight issue or the failure report.
    Diagnostic {
        /// Rendered report text.
        report: Arc<str>,
    },

    /// Terminal event. Exactly one per run, always the last one.
    Finished {
        /// How the run ended.
        outcome: RunOutcome,
        /// One-line summary, e.g. `"Completed successfully in 0h 2m 13s"`.
        summary: Arc<str>,
        /// Wall-clock time since the run was accepted.
        elapsed: Duration,
    },

    // === Solver output ===
    /// One raw line of the merged stdout/stderr stream (line ending stripped).
    OutputLine {
        /// The line text.
        line: Arc<str>,
    },

    /// Iteration progress.
    Progress {
        /// Highest iteration seen so far.
        iteration: u64,
        /// Largest iteration bound seen so far (`0` = unknown).
        max_iteration: u64,
        /// Time since the run started.
        elapsed: Duration,
        /// Estimated remaining time, when `max_iteration` is known.
        eta: Option<Duration>,
    },

    /// Convergence residual reported by one of the solvers.
    Convergence {
        /// Reporting solver.
        solver: Solver,
        /// Iteration the sample belongs to (current iteration at the time).
        iteration: u64,
        /// Parsed residual value.
        residual: f64,
    },

    /// A phase header line was seen.
    PhaseChanged {
        /// Header text with the `-`/`=` decoration stripped.
        label: Arc<str>,
    },

    // === Subscribers ===
    /// A subscriber fell behind and missed output events of the last run.
    ///
    /// Reported once per run and subscriber, after that run's `Finished`.
    SubscriberOverflow {
        /// Subscriber name.
        subscriber: &'static str,
        /// Number of events it did not receive.
        dropped: u64,
    },

    /// A subscriber panicked while processing an event.
    SubscriberPanicked {
        /// Subscriber name.
        subscriber: &'static str,
        /// Panic message.
        info: Arc<str>,
    },
}

impl EventKind {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::Started { .. } => "started",
            EventKind::CancelRequested => "cancel_requested",
            EventKind::Diagnostic { .. } => "diagnostic",
            EventKind::Finished { .. } => "finished",
            EventKind::OutputLine { .. } => "output_line",
            EventKind::Progress { .. } => "progress",
            EventKind::Convergence { .. } => "convergence",
            EventKind::PhaseChanged { .. } => "phase_changed",
            EventKind::SubscriberOverflow { .. } => "subscriber_overflow",
            EventKind::SubscriberPanicked { .. } => "subscriber_panicked",
        }
    }
}

/// Run event with ordering metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `run`: run the event belongs to (`None` for subscriber events)
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Owning run, if any.
    pub run: Option<RunId>,
    /// Event classification and payload.
    pub kind: EventKind,
}

impl Event {
    /// Creates a run event with the current timestamp and next sequence number.
    pub fn now(run: RunId, kind: EventKind) -> Self {
        Self::build(Some(run), kind)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, dropped: u64) -> Self {
        Self::build(
            None,
            EventKind::SubscriberOverflow {
                subscriber,
                dropped,
            },
        )
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Self::build(
            None,
            EventKind::SubscriberPanicked {
                subscriber,
                info: info.into(),
            },
        )
    }

    /// True for the terminal [`EventKind::Finished`].
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.kind, EventKind::Finished { .. })
    }

    /// True for events every subscriber must receive: `Started`,
    /// `CancelRequested`, `Diagnostic` and `Finished`.
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Started { .. }
                | EventKind::CancelRequested
                | EventKind::Diagnostic { .. }
                | EventKind::Finished { .. }
        )
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow { .. })
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked { .. })
    }

    fn build(run: Option<RunId>, kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            run,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(RunId::new(1), EventKind::CancelRequested);
        let b = Event::now(RunId::new(1), EventKind::CancelRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn cancelled_has_no_exit_code() {
        assert_eq!(RunOutcome::Cancelled.exit_code(), None);
        assert_eq!(RunOutcome::Succeeded.exit_code(), Some(0));
        assert_eq!(RunOutcome::Failed { exit_code: -11 }.exit_code(), Some(-11));
        assert!(RunOutcome::Cancelled.is_cancelled());
    }

    #[test]
    fn subscriber_events_have_no_run() {
        let ev = Event::subscriber_overflow("log", 3);
        assert!(ev.run.is_none());
        assert!(ev.is_subscriber_overflow());
        assert!(!ev.is_finished());
        assert!(!ev.is_lifecycle());
    }

    #[test]
    fn lifecycle_split() {
        let run = RunId::new(1);
        assert!(Event::now(run, EventKind::CancelRequested).is_lifecycle());
        assert!(Event::now(run, EventKind::Diagnostic { report: "x".into() }).is_lifecycle());
        assert!(!Event::now(run, EventKind::OutputLine { line: "x".into() }).is_lifecycle());
        assert!(!Event::now(run, EventKind::PhaseChanged { label: "x".into() }).is_lifecycle());
    }
}
