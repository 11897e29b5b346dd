//! # One supervised run, from first output line to `Finished`.
//!
//! The worker exclusively owns the process handle, the line channel, the
//! parser and the output buffer. Everything observable leaves through the bus.
//!
//! ## Loop
//! ```text
//!            ┌──────────── select! (biased) ─────────────┐
//!            │ 1. token.cancelled()  → cancel path        │
//!            │ 2. lines.recv()       → OutputLine, derived│   until EOF
//!            │ 3. proc.wait()        → exit code          │   once
//!            │ 4. drain deadline     → stop reading       │   after exit
//!            └────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - For each line: `OutputLine` first, then its derived events in rule order.
//! - Publishing waits for room in the subscriber feed, so slow subscribers
//!   throttle reading. Output events give way to cancellation; lifecycle
//!   events are always delivered.
//! - Cancellation is checked before every line (biased select); buffered
//!   output is discarded on cancel.
//! - After the process exits, remaining output is drained until EOF or
//!   `Config::drain_grace`, so `Finished` follows the last `OutputLine`.
//! - A failed exit publishes `Diagnostic` immediately before `Finished`.
//! - Exactly one `Finished` per run; [`run_guarded`] covers panics.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::Config;
use super::process::{SolverProcess, terminate_with_grace};
use super::reader::LineResult;
use crate::diagnose::{DiagnosticReport, EvidenceScanner};
use crate::events::{Bus, Event, EventKind, RunId, RunOutcome};
use crate::parse::{LineSignal, OutputParser};

/// Final result of a run, returned by [`RunHandle::wait`](crate::RunHandle::wait).
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: RunId,
    pub outcome: RunOutcome,
    /// Same text as the `Finished` event summary.
    pub summary: String,
    pub elapsed: Duration,
    /// Present for failed exits.
    pub diagnostic: Option<DiagnosticReport>,
}

enum Ended {
    Exited(i64),
    Cancelled,
    Aborted(String),
}

pub(crate) struct RunWorker<P: SolverProcess> {
    id: RunId,
    bus: Bus,
    token: CancellationToken,
    proc: P,
    lines: mpsc::Receiver<LineResult>,
    parser: OutputParser,
    buffer: VecDeque<String>,
    buffer_limit: Option<usize>,
    lines_seen: usize,
    scanner: EvidenceScanner,
    grace: Duration,
    drain_grace: Duration,
    parallel: bool,
    started_at: Instant,
    finished: Arc<AtomicBool>,
}

impl<P: SolverProcess> RunWorker<P> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: RunId,
        bus: Bus,
        cfg: &Config,
        token: CancellationToken,
        proc: P,
        lines: mpsc::Receiver<LineResult>,
        parser: OutputParser,
        parallel: bool,
    ) -> Self {
        Self {
            id,
            bus,
            token,
            proc,
            lines,
            parser,
            buffer: VecDeque::new(),
            buffer_limit: cfg.buffer_limit(),
            lines_seen: 0,
            scanner: cfg.evidence_scanner(),
            grace: cfg.grace,
            drain_grace: cfg.drain_grace,
            parallel,
            started_at: Instant::now(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn publish(&mut self, kind: EventKind) {
        self.bus.deliver(Event::now(self.id, kind)).await;
    }

    /// Publishes an output event unless cancellation arrives first.
    async fn publish_output(&mut self, kind: EventKind) {
        let ev = Event::now(self.id, kind);
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {}
            _ = self.bus.deliver(ev) => {}
        }
    }

    pub(crate) async fn run(mut self) -> RunReport {
        let ended = self.drive().await;
        self.finish(ended).await
    }

    async fn drive(&mut self) -> Ended {
        let mut exit: Option<i64> = None;
        let mut eof = false;
        let mut drain_deadline = Instant::now();

        loop {
            if let (Some(code), true) = (exit, eof) {
                return Ended::Exited(code);
            }
            let draining = exit.is_some();

            tokio::select! {
                biased;

                _ = self.token.cancelled() => {
                    return self.cancel().await;
                }

                item = self.lines.recv(), if !eof => match item {
                    Some(Ok(line)) => self.handle_line(line).await,
                    Some(Err(e)) => {
                        warn!(run = %self.id, error = %e, "output stream failed");
                        if exit.is_none() {
                            terminate_with_grace(&mut self.proc, self.grace).await;
                        }
                        return Ended::Aborted(format!("output stream failed: {e}"));
                    }
                    None => eof = true,
                },

                status = self.proc.wait(), if exit.is_none() => match status {
                    Ok(code) => {
                        debug!(run = %self.id, code, "process exited");
                        exit = Some(code);
                        drain_deadline = Instant::now() + self.drain_grace;
                    }
                    Err(e) => {
                        self.proc.force_kill().await;
                        return Ended::Aborted(format!("waiting for the solver failed: {e}"));
                    }
                },

                _ = time::sleep_until(drain_deadline), if draining && !eof => {
                    warn!(run = %self.id, "output still open after exit, stopping read");
                    eof = true;
                }
            }
        }
    }

    async fn cancel(&mut self) -> Ended {
        info!(run = %self.id, "cancel requested");
        self.publish(EventKind::CancelRequested).await;
        let code = terminate_with_grace(&mut self.proc, self.grace).await;
        debug!(run = %self.id, ?code, "process stopped after cancel");
        Ended::Cancelled
    }

    async fn handle_line(&mut self, line: String) {
        self.lines_seen += 1;
        let text: Arc<str> = Arc::from(line.as_str());
        self.remember(line);
        self.publish_output(EventKind::OutputLine { line: text.clone() })
            .await;

        let parser = &mut self.parser;
        let signals =
            match std::panic::catch_unwind(AssertUnwindSafe(|| parser.parse_line(&text))) {
                Ok(signals) => signals,
                Err(_) => {
                    warn!(run = %self.id, line = %text, "parse rule panicked, line forwarded as-is");
                    return;
                }
            };

        for signal in signals {
            let kind = match signal {
                LineSignal::Progress {
                    iteration,
                    max_iteration,
                } => {
                    let elapsed = self.started_at.elapsed();
                    EventKind::Progress {
                        iteration,
                        max_iteration,
                        elapsed,
                        eta: self.parser.state().eta(elapsed),
                    }
                }
                LineSignal::Convergence {
                    solver,
                    iteration,
                    residual,
                } => EventKind::Convergence {
                    solver,
                    iteration,
                    residual,
                },
                LineSignal::Phase { label } => EventKind::PhaseChanged {
                    label: label.into(),
                },
            };
            self.publish_output(kind).await;
        }
    }

    fn remember(&mut self, line: String) {
        if let Some(limit) = self.buffer_limit {
            while self.buffer.len() >= limit {
                self.buffer.pop_front();
            }
        }
        self.buffer.push_back(line);
    }

    async fn finish(mut self, ended: Ended) -> RunReport {
        let elapsed = self.started_at.elapsed();
        let mut diagnostic = None;

        let outcome = match ended {
            Ended::Exited(0) => RunOutcome::Succeeded,
            Ended::Exited(exit_code) => {
                let evidence = self
                    .scanner
                    .scan(self.buffer.iter().map(String::as_str), self.parallel);
                let report = DiagnosticReport::build(exit_code, evidence);
                self.publish(EventKind::Diagnostic {
                    report: report.render().into(),
                })
                .await;
                diagnostic = Some(report);
                RunOutcome::Failed { exit_code }
            }
            Ended::Cancelled => RunOutcome::Cancelled,
            Ended::Aborted(reason) => RunOutcome::Aborted {
                reason: reason.into(),
            },
        };

        let summary = summarize(&outcome, elapsed);
        info!(run = %self.id, outcome = outcome.as_label(), lines = self.lines_seen, "{summary}");
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.publish(EventKind::Finished {
                outcome: outcome.clone(),
                summary: summary.as_str().into(),
                elapsed,
            })
            .await;
        }

        RunReport {
            run: self.id,
            outcome,
            summary,
            elapsed,
            diagnostic,
        }
    }
}

/// `1h 2m 3s`.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// One-line summary carried by `Finished`.
pub(crate) fn summarize(outcome: &RunOutcome, elapsed: Duration) -> String {
    let t = format_elapsed(elapsed);
    match outcome {
        RunOutcome::Succeeded => format!("Completed successfully in {t}"),
        RunOutcome::Failed { exit_code } => {
            let c = crate::diagnose::classify(*exit_code);
            format!("Exited with code {exit_code} ({}) after {t}", c.title())
        }
        RunOutcome::Cancelled => format!("Cancelled after {t}"),
        RunOutcome::NotStarted { message, .. } => format!("Not started: {message}"),
        RunOutcome::Aborted { reason } => format!("Aborted after {t}: {reason}"),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `worker`; a panic still yields exactly one `Finished(Aborted)`.
///
/// The process handle is dropped during unwinding, which kills the child.
pub(crate) async fn run_guarded<P: SolverProcess>(worker: RunWorker<P>) -> RunReport {
    let id = worker.id;
    let bus = worker.bus.clone();
    let finished = Arc::clone(&worker.finished);
    let started_at = worker.started_at;

    match AssertUnwindSafe(worker.run()).catch_unwind().await {
        Ok(report) => report,
        Err(panic) => {
            let reason = format!("internal error: {}", panic_message(panic.as_ref()));
            error!(run = %id, %reason, "run worker panicked");
            let elapsed = started_at.elapsed();
            let outcome = RunOutcome::Aborted {
                reason: reason.as_str().into(),
            };
            let summary = summarize(&outcome, elapsed);
            if !finished.swap(true, Ordering::AcqRel) {
                bus.deliver(Event::now(
                    id,
                    EventKind::Finished {
                        outcome: outcome.clone(),
                        summary: summary.as_str().into(),
                        elapsed,
                    },
                ))
                .await;
            }
            RunReport {
                run: id,
                outcome,
                summary,
                elapsed,
                diagnostic: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use crate::events::Solver;
    use crate::parse::{ParseState, Rule, default_rules};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::{Notify, broadcast};

    #[derive(Default, Clone)]
    struct Flags {
        terminated: Arc<AtomicBool>,
        killed: Arc<AtomicBool>,
        wake: Arc<Notify>,
    }

    struct FakeProcess {
        exit_code: Option<i64>,
        ignore_term: bool,
        flags: Flags,
    }

    impl FakeProcess {
        fn exits_with(code: i64) -> (Self, Flags) {
            Self::build(Some(code), false)
        }

        fn runs_forever(ignore_term: bool) -> (Self, Flags) {
            Self::build(None, ignore_term)
        }

        fn build(exit_code: Option<i64>, ignore_term: bool) -> (Self, Flags) {
            let flags = Flags::default();
            let p = Self {
                exit_code,
                ignore_term,
                flags: flags.clone(),
            };
            (p, flags)
        }
    }

    #[async_trait]
    impl SolverProcess for FakeProcess {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }

        fn request_terminate(&mut self) -> io::Result<()> {
            if !self.ignore_term {
                self.flags.terminated.store(true, Ordering::SeqCst);
                self.flags.wake.notify_one();
            }
            Ok(())
        }

        async fn force_kill(&mut self) {
            self.flags.killed.store(true, Ordering::SeqCst);
            self.flags.wake.notify_one();
        }

        async fn wait(&mut self) -> io::Result<i64> {
            loop {
                if self.flags.killed.load(Ordering::SeqCst) {
                    return Ok(-9);
                }
                if self.flags.terminated.load(Ordering::SeqCst) {
                    return Ok(-15);
                }
                if let Some(code) = self.exit_code {
                    return Ok(code);
                }
                self.flags.wake.notified().await;
            }
        }
    }

    struct Harness {
        bus: Bus,
        rx: broadcast::Receiver<Event>,
        cfg: Config,
        token: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let bus = Bus::new(1024);
            let rx = bus.subscribe();
            let cfg = Config {
                grace: Duration::from_millis(200),
                drain_grace: Duration::from_millis(200),
                ..Config::default()
            };
            Self {
                bus,
                rx,
                cfg,
                token: CancellationToken::new(),
            }
        }

        fn worker(
            &self,
            proc: FakeProcess,
            lines: mpsc::Receiver<LineResult>,
            parser: OutputParser,
        ) -> RunWorker<FakeProcess> {
            RunWorker::new(
                RunId::new(1),
                self.bus.clone(),
                &self.cfg,
                self.token.clone(),
                proc,
                lines,
                parser,
                false,
            )
        }

        fn drain(&mut self) -> Vec<EventKind> {
            let mut out = Vec::new();
            while let Ok(ev) = self.rx.try_recv() {
                out.push(ev.kind);
            }
            out
        }
    }

    fn feed(lines: &[&str]) -> mpsc::Receiver<LineResult> {
        let (tx, rx) = mpsc::channel(64);
        for l in lines {
            tx.try_send(Ok(l.to_string())).unwrap();
        }
        rx
    }

    fn finished_count(events: &[EventKind]) -> usize {
        events
            .iter()
            .filter(|k| matches!(k, EventKind::Finished { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_output_line_precedes_derived_events() {
        let mut h = Harness::new();
        let (proc, _) = FakeProcess::exits_with(0);
        let w = h.worker(proc, feed(&["iT = 4200", "NS residual = 1.2e-7"]), OutputParser::new());
        let report = run_guarded(w).await;
        assert!(report.outcome.is_success());

        let ev = h.drain();
        assert_eq!(ev.len(), 5);
        assert_eq!(ev[0], EventKind::OutputLine { line: "iT = 4200".into() });
        assert!(matches!(
            ev[1],
            EventKind::Progress { iteration: 4200, max_iteration: 0, eta: None, .. }
        ));
        assert_eq!(
            ev[2],
            EventKind::OutputLine {
                line: "NS residual = 1.2e-7".into()
            }
        );
        assert_eq!(
            ev[3],
            EventKind::Convergence {
                solver: Solver::Ns,
                iteration: 4200,
                residual: 1.2e-7
            }
        );
        assert!(matches!(
            ev[4],
            EventKind::Finished { outcome: RunOutcome::Succeeded, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_exit_publishes_diagnostic_before_finished() {
        let mut h = Harness::new();
        let (proc, _) = FakeProcess::exits_with(-1073741819);
        let w = h.worker(
            proc,
            feed(&["Reading geometry", "Error: geometry read failed"]),
            OutputParser::new(),
        );
        let report = run_guarded(w).await;
        assert_eq!(report.outcome, RunOutcome::Failed { exit_code: -1073741819 });
        assert!(report.summary.contains("Access Violation"));
        assert!(report.diagnostic.is_some());

        let ev = h.drain();
        let n = ev.len();
        assert!(matches!(ev[n - 2], EventKind::Diagnostic { .. }));
        assert!(matches!(ev[n - 1], EventKind::Finished { .. }));
        if let EventKind::Diagnostic { report } = &ev[n - 2] {
            assert!(report.contains("nx * ny * nz"));
            assert!(report.contains("Error: geometry read failed"));
        }
    }

    #[tokio::test]
    async fn test_reader_error_aborts_with_single_finished() {
        let mut h = Harness::new();
        let (proc, flags) = FakeProcess::runs_forever(false);
        let (tx, rx) = mpsc::channel(8);
        tx.try_send(Ok("iT = 1".to_string())).unwrap();
        tx.try_send(Err(io::Error::other("broken pipe"))).unwrap();

        let report = run_guarded(h.worker(proc, rx, OutputParser::new())).await;
        assert!(matches!(report.outcome, RunOutcome::Aborted { .. }));
        assert!(flags.terminated.load(Ordering::SeqCst));

        let ev = h.drain();
        assert_eq!(finished_count(&ev), 1);
        assert!(matches!(ev.last(), Some(EventKind::Finished { .. })));
    }

    #[tokio::test]
    async fn test_cancel_terminates_and_reports_cancelled() {
        let mut h = Harness::new();
        let (proc, flags) = FakeProcess::runs_forever(false);
        let (tx, rx) = mpsc::channel(8);
        tx.try_send(Ok("iT = 10".to_string())).unwrap();

        let w = h.worker(proc, rx, OutputParser::new());
        let token = h.token.clone();
        let task = tokio::spawn(run_guarded(w));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        // Output queued after cancel must not surface.
        let _ = tx.try_send(Ok("iT = 11".to_string()));

        let report = task.await.unwrap();
        assert!(report.outcome.is_cancelled());
        assert!(flags.terminated.load(Ordering::SeqCst));
        assert!(!flags.killed.load(Ordering::SeqCst));

        let ev = h.drain();
        assert_eq!(finished_count(&ev), 1);
        assert!(ev.contains(&EventKind::CancelRequested));
        assert!(!ev.contains(&EventKind::OutputLine { line: "iT = 11".into() }));
        assert!(matches!(ev.last(), Some(EventKind::Finished { outcome: RunOutcome::Cancelled, .. })));
    }

    #[tokio::test]
    async fn test_ignored_terminate_escalates_to_kill() {
        let h = Harness::new();
        let (proc, flags) = FakeProcess::runs_forever(true);
        let (_tx, rx) = mpsc::channel(8);
        let w = h.worker(proc, rx, OutputParser::new());
        h.token.cancel();
        let report = run_guarded(w).await;
        assert!(report.outcome.is_cancelled());
        assert!(flags.killed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_rule_does_not_abort_run() {
        fn explode(line: &str, _st: &mut ParseState, _out: &mut Vec<LineSignal>) {
            if line.contains("boom") {
                panic!("rule exploded");
            }
        }
        let mut rules = default_rules();
        rules.insert(0, Rule::new("explode", explode));

        let mut h = Harness::new();
        let (proc, _) = FakeProcess::exits_with(0);
        let w = h.worker(proc, feed(&["boom", "iT = 5"]), OutputParser::with_rules(rules));
        let report = run_guarded(w).await;
        assert!(report.outcome.is_success());

        let ev = h.drain();
        assert_eq!(ev[0], EventKind::OutputLine { line: "boom".into() });
        assert_eq!(ev[1], EventKind::OutputLine { line: "iT = 5".into() });
        assert!(matches!(ev[2], EventKind::Progress { iteration: 5, .. }));
        assert_eq!(finished_count(&ev), 1);
    }

    #[tokio::test]
    async fn test_buffer_keeps_most_recent_lines() {
        let mut h = Harness::new();
        h.cfg.max_buffered_lines = 2;
        let (proc, _) = FakeProcess::exits_with(1);
        let w = h.worker(
            proc,
            feed(&["error one", "error two", "error three"]),
            OutputParser::new(),
        );
        let report = run_guarded(w).await;
        let diag = report.diagnostic.unwrap();
        assert_eq!(diag.evidence.lines, vec!["error two", "error three"]);
    }

    #[tokio::test]
    async fn test_full_feed_throttles_reading_but_not_cancel() {
        let (bus, mut rx) = Bus::with_feed(2);
        let h = Harness {
            bus,
            ..Harness::new()
        };
        let (proc, _) = FakeProcess::runs_forever(false);
        let lines: Vec<String> = (1..=10).map(|n| format!("line {n}")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let w = h.worker(proc, feed(&refs), OutputParser::with_rules(Vec::new()));
        let run = tokio::spawn(run_guarded(w));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished());

        h.token.cancel();
        let mut seen = Vec::new();
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let done = ev.is_finished();
            seen.push(ev.kind);
            if done {
                break;
            }
        }
        let report = run.await.unwrap();
        assert!(report.outcome.is_cancelled());

        let outputs = seen
            .iter()
            .filter(|k| matches!(k, EventKind::OutputLine { .. }))
            .count();
        assert!(outputs < 10, "reading should stall behind a full feed");
        let cancel_at = seen
            .iter()
            .position(|k| matches!(k, EventKind::CancelRequested))
            .unwrap();
        assert!(seen[cancel_at..]
            .iter()
            .all(|k| !matches!(k, EventKind::OutputLine { .. })));
        assert_eq!(finished_count(&seen), 1);
    }

    #[test]
    fn test_summary_wording() {
        let d = Duration::from_secs(3725);
        assert_eq!(summarize(&RunOutcome::Succeeded, d), "Completed successfully in 1h 2m 5s");
        assert_eq!(summarize(&RunOutcome::Cancelled, d), "Cancelled after 1h 2m 5s");
        assert!(summarize(&RunOutcome::Failed { exit_code: 1 }, d).starts_with("Exited with code 1 ("));
    }
}
