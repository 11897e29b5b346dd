//! # Supervisor: accepts runs, launches the solver, fans events out.
//!
//! The [`Supervisor`] owns the event bus, the subscriber listener and the
//! single run slot. Each accepted run gets a [`RunWorker`] task that owns the
//! process; the supervisor only keeps the run's cancellation token.
//!
//! ## Start sequence
//! ```text
//! start(req)
//!   ├─► claim slot (AlreadyRunning if taken)
//!   ├─► run_preflight(req)               (blocking pool)
//!   │     ├─► Diagnostic per issue
//!   │     └─► blocking issue ─► Finished(NotStarted) ─► Err(RunError)
//!   ├─► spawn(plan, start_timeout)
//!   │     └─► failure       ─► Diagnostic ─► Finished(NotStarted) ─► Err(RunError)
//!   ├─► spawn_line_reader(pipe)
//!   ├─► Started{pid, command}
//!   └─► tokio::spawn(run_guarded(worker)) ─► RunHandle
//! ```
//!
//! ## Event flow
//! ```text
//! Supervisor / RunWorker ── deliver ──► Bus ──┬──► feed ──► listener ──► SubscriberSet ──► subscribers
//!                                             └──► Supervisor::subscribe() receivers
//! ```
//!
//! The feed is bounded and lossless: when subscribers fall behind, `deliver`
//! waits, the worker stops reading, and the solver blocks on its pipe.
//!
//! ## Rules
//! - At most one run per supervisor; the slot frees once the worker returned.
//! - `cancel()` never blocks: it cancels the token, the worker does the rest.
//! - Every accepted `start()` ends with exactly one `Finished`, including
//!   pre-flight and launch failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::builder::SupervisorBuilder;
use super::config::Config;
use super::launcher::{self, LaunchPlan};
use super::process::SolverProcess;
use super::reader::spawn_line_reader;
use super::request::RunRequest;
use super::worker::{RunReport, RunWorker, run_guarded, summarize};
use crate::error::RunError;
use crate::events::{Bus, Event, EventKind, RunId, RunOutcome};
use crate::parse::{OutputParser, Rule};
use crate::preflight::run_preflight;
use crate::subscribers::SubscriberSet;

/// Occupant of the run slot.
struct ActiveRun {
    id: RunId,
    token: CancellationToken,
}

/// Launches and supervises solver runs, one at a time.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    rules: Vec<Rule>,
    active: Arc<watch::Sender<Option<ActiveRun>>>,
    next_run: AtomicU64,
    closing: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Shorthand for [`SupervisorBuilder::new`].
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// Wires the supervisor and spawns the subscriber listener.
    ///
    /// Must be called inside a tokio runtime.
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        feed: mpsc::Receiver<Event>,
        subs: SubscriberSet,
        rules: Vec<Rule>,
    ) -> Self {
        let closing = CancellationToken::new();
        let listener = spawn_listener(feed, subs, closing.clone());
        let (active, _) = watch::channel(None);

        Self {
            cfg,
            bus,
            rules,
            active: Arc::new(active),
            next_run: AtomicU64::new(1),
            closing,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// The bus every run publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Direct receiver for run events, in publish order.
    ///
    /// Only events published after this call are observed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// True while a run occupies the slot (pre-flight included).
    pub fn is_running(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Id of the active run, if any.
    pub fn active_run(&self) -> Option<RunId> {
        self.active.borrow().as_ref().map(|a| a.id)
    }

    /// Starts a run.
    ///
    /// Returns once the process is running (or was refused). Events of the run,
    /// including the terminal `Finished`, are delivered through the bus.
    ///
    /// # Errors
    /// - [`RunError::AlreadyRunning`] when another run is active (no events).
    /// - Pre-flight and launch failures; these also publish `Finished(NotStarted)`.
    pub async fn start(&self, req: RunRequest) -> Result<RunHandle, RunError> {
        let id = RunId::new(self.next_run.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        if !self.claim(id, token.clone()) {
            debug!(run = %id, "start refused, a run is active");
            return Err(RunError::AlreadyRunning);
        }
        let accepted_at = Instant::now();

        match self.launch(id, token.clone(), req).await {
            Ok(join) => Ok(RunHandle { id, token, join }),
            Err(err) => {
                let outcome = RunOutcome::NotStarted {
                    label: err.as_label(),
                    message: err.as_message().into(),
                };
                let elapsed = accepted_at.elapsed();
                let summary = summarize(&outcome, elapsed);
                warn!(run = %id, error = err.as_label(), "{summary}");
                self.publish(
                    id,
                    EventKind::Finished {
                        outcome,
                        summary: summary.into(),
                        elapsed,
                    },
                )
                .await;
                release(&self.active, id);
                Err(err)
            }
        }
    }

    /// Requests cancellation of the active run. No-op when idle.
    ///
    /// Returns immediately; the run ends with `Finished(Cancelled)` once the
    /// process is gone.
    pub fn cancel(&self) {
        if let Some(active) = self.active.borrow().as_ref() {
            info!(run = %active.id, "cancel requested by caller");
            active.token.cancel();
        }
    }

    /// Cancels any active run, waits for it to finish, then drains and stops
    /// the subscribers.
    ///
    /// The supervisor accepts no further events for subscribers afterwards.
    pub async fn close(&self) {
        self.cancel();
        let mut idle = self.active.subscribe();
        let _ = idle.wait_for(Option::is_none).await;

        self.closing.cancel();
        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.await;
        }
    }

    fn claim(&self, id: RunId, token: CancellationToken) -> bool {
        self.active.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(ActiveRun { id, token });
            true
        })
    }

    async fn publish(&self, id: RunId, kind: EventKind) {
        self.bus.deliver(Event::now(id, kind)).await;
    }

    async fn launch(
        &self,
        id: RunId,
        token: CancellationToken,
        req: RunRequest,
    ) -> Result<JoinHandle<RunReport>, RunError> {
        let (req, issues) = tokio::task::spawn_blocking(move || {
            let issues = run_preflight(&req);
            (req, issues)
        })
        .await
        .map_err(|e| RunError::SpawnFailed {
            reason: format!("pre-flight task failed: {e}"),
        })?;

        for issue in &issues {
            debug!(run = %id, kind = issue.kind.as_label(), blocking = issue.is_blocking(), "pre-flight finding");
            self.publish(
                id,
                EventKind::Diagnostic {
                    report: issue.render().into(),
                },
            )
            .await;
        }
        if let Some(err) = RunError::from_preflight(issues) {
            return Err(err);
        }

        let plan = LaunchPlan::from_request(&req);
        let command = plan.display();
        info!(run = %id, %command, cwd = %plan.cwd.display(), "launching solver");

        let (proc, pipe) = match launcher::spawn(&plan, self.cfg.start_timeout()).await {
            Ok(spawned) => spawned,
            Err(err) => {
                self.publish(
                    id,
                    EventKind::Diagnostic {
                        report: format!("LAUNCH ERROR\n{}", err.as_message()).into(),
                    },
                )
                .await;
                return Err(err);
            }
        };

        // The reader thread is detached: it ends at EOF or once the worker
        // drops the receiver and the next line arrives.
        let (lines, _reader) = spawn_line_reader(pipe, self.cfg.line_queue_clamped())
            .map_err(|e| RunError::SpawnFailed {
                reason: format!("cannot start output reader: {e}"),
            })?;

        self.publish(
            id,
            EventKind::Started {
                pid: proc.id(),
                command: command.into(),
            },
        )
        .await;

        let worker = RunWorker::new(
            id,
            self.bus.clone(),
            &self.cfg,
            token,
            proc,
            lines,
            OutputParser::with_rules(self.rules.clone()),
            req.uses_launcher(),
        );
        let slot = Arc::clone(&self.active);
        Ok(tokio::spawn(async move {
            let report = run_guarded(worker).await;
            release(&slot, id);
            report
        }))
    }
}

impl Drop for Supervisor {
    /// Stops the listener; queued events still reach the subscribers.
    fn drop(&mut self) {
        self.closing.cancel();
    }
}

/// Frees the slot if it still belongs to `id`.
fn release(slot: &watch::Sender<Option<ActiveRun>>, id: RunId) {
    slot.send_if_modified(|s| match s {
        Some(active) if active.id == id => {
            *s = None;
            true
        }
        _ => false,
    });
}

/// Forwards feed events to the subscriber set until `closing` fires, then
/// delivers what is already queued and shuts the set down.
///
/// The feed receiver is dropped before the set drains, so a publisher still
/// waiting on it returns instead of hanging.
fn spawn_listener(
    mut feed: mpsc::Receiver<Event>,
    mut subs: SubscriberSet,
    closing: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = feed.recv() => match msg {
                    Some(ev) => subs.deliver(Arc::new(ev)).await,
                    None => break,
                },
                _ = closing.cancelled() => {
                    while let Ok(ev) = feed.try_recv() {
                        subs.deliver(Arc::new(ev)).await;
                    }
                    break;
                }
            }
        }
        drop(feed);
        subs.shutdown().await;
    })
}

/// Handle to an accepted run.
///
/// Dropping the handle does not cancel the run.
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    token: CancellationToken,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Same as [`Supervisor::cancel`] for this run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the worker has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the run to end and returns its report.
    pub async fn wait(self) -> RunReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                let outcome = RunOutcome::Aborted {
                    reason: format!("run task failed: {e}").into(),
                };
                RunReport {
                    run: self.id,
                    summary: summarize(&outcome, Duration::ZERO),
                    outcome,
                    elapsed: Duration::ZERO,
                    diagnostic: None,
                }
            }
        }
    }
}
