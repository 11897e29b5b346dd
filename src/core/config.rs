//! # Supervisor configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Supervisor`](crate::Supervisor)
//! and every run it starts.
//!
//! ## Sentinel values
//! - `grace = 0s` → no graceful window, kill immediately on cancel
//! - `start_timeout = 0s` → spawn is not bounded
//! - `max_buffered_lines = 0` → the diagnostic output buffer is unbounded
//! - `subscriber_stall = 0s` → output events never wait for a full subscriber queue

use std::time::Duration;

use crate::diagnose::EvidenceScanner;

/// Configuration shared by every run of one supervisor.
///
/// ## Field semantics
/// - `grace`: wait between the terminate request and the forced kill
/// - `start_timeout`: bound on the spawn call (`0s` = unbounded)
/// - `drain_grace`: how long the worker keeps reading output after the process exited
/// - `bus_capacity`: event bus ring buffer and subscriber feed size (min 1; clamped by Bus)
/// - `subscriber_stall`: how long an output event waits for a full subscriber queue
/// - `line_queue`: reader thread → worker channel capacity (min 1)
/// - `max_buffered_lines`: output lines kept for diagnostics (`0` = unlimited)
/// - `max_evidence_lines`: evidence lines quoted in a diagnostic report
/// - `short_output_lines`: output shorter than this is reported as an immediate crash
///
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Time between the terminate request and the forced kill on cancel.
    ///
    /// The terminate request goes to the whole process group on Unix, so MPI
    /// ranks get it too.
    pub grace: Duration,

    /// Maximum time for the process to reach a running state.
    pub start_timeout: Duration,

    /// After the process exits, output still in the pipe is read for at most
    /// this long. A grandchild holding the pipe open cannot stall the run.
    pub drain_grace: Duration,

    /// Capacity of the event bus broadcast ring and of the subscriber feed.
    ///
    /// Direct receivers that lag behind more than `bus_capacity` messages
    /// receive `Lagged` and skip older items. Subscribers do not lag: a full
    /// feed makes the run worker wait.
    pub bus_capacity: usize,

    /// How long an output event waits for room in a subscriber's queue.
    ///
    /// Within this window a slow subscriber throttles the run. A subscriber
    /// still full afterwards misses output events until it catches up; the
    /// count is reported once per run. Lifecycle events always wait.
    pub subscriber_stall: Duration,

    /// Capacity of the channel between the reader thread and the worker.
    ///
    /// When full, the reader thread blocks, which in turn applies back-pressure
    /// to the solver through the pipe.
    pub line_queue: usize,

    /// Maximum number of output lines kept for the failure report.
    ///
    /// Oldest lines are dropped first.
    pub max_buffered_lines: usize,

    /// Maximum number of evidence lines quoted in a failure report.
    pub max_evidence_lines: usize,

    /// Output with fewer lines than this is reported as an immediate crash.
    pub short_output_lines: usize,
}

impl Config {
    /// Returns the spawn bound as an `Option`.
    #[inline]
    pub fn start_timeout(&self) -> Option<Duration> {
        if self.start_timeout == Duration::ZERO {
            None
        } else {
            Some(self.start_timeout)
        }
    }

    /// Returns the output buffer limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn buffer_limit(&self) -> Option<usize> {
        if self.max_buffered_lines == 0 {
            None
        } else {
            Some(self.max_buffered_lines)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the line queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn line_queue_clamped(&self) -> usize {
        self.line_queue.max(1)
    }

    /// Evidence scanner configured from this config.
    pub fn evidence_scanner(&self) -> EvidenceScanner {
        EvidenceScanner::new(self.max_evidence_lines, self.short_output_lines)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 5s`
    /// - `start_timeout = 10s`
    /// - `drain_grace = 1s`
    /// - `bus_capacity = 4096` (solver output is chatty)
    /// - `subscriber_stall = 5s`
    /// - `line_queue = 1024`
    /// - `max_buffered_lines = 20000`
    /// - `max_evidence_lines = 10`
    /// - `short_output_lines = 5`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            start_timeout: Duration::from_secs(10),
            drain_grace: Duration::from_secs(1),
            bus_capacity: 4096,
            subscriber_stall: Duration::from_secs(5),
            line_queue: 1024,
            max_buffered_lines: 20_000,
            max_evidence_lines: 10,
            short_output_lines: 5,
        }
    }
}
