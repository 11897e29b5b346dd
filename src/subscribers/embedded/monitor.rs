//! # Latest-progress tracker.
//!
//! [`ProgressMonitor`] keeps one [`ProgressSnapshot`] that a UI can poll at its
//! own pace (status bar, progress bar) instead of consuming every event.
//!
//! ```text
//! Bus ──► listener ──► ProgressMonitor::on_event() ──► RwLock<ProgressSnapshot>
//!                                                             │
//!                                             UI ◄── snapshot()
//! ```
//!
//! ## Rules
//! - `Started` resets the snapshot for the new run.
//! - Events of an older run than the tracked one are ignored.
//! - `iteration` and `max_iteration` only move forward within a run.
//! - `Finished` freezes the snapshot and records the outcome.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind, RunId, RunOutcome};
use crate::subscribers::Subscribe;

/// Point-in-time view of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub run: Option<RunId>,
    pub iteration: u64,
    /// `0` = unknown.
    pub max_iteration: u64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
    pub phase: Option<String>,
    /// Set once the run has finished.
    pub outcome: Option<RunOutcome>,
}

impl ProgressSnapshot {
    /// Percent complete in `[0, 100]`, when the bound is known.
    pub fn percent(&self) -> Option<f64> {
        if self.max_iteration == 0 {
            return None;
        }
        Some((self.iteration as f64 * 100.0 / self.max_iteration as f64).min(100.0))
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Stateful subscriber holding the latest progress.
#[derive(Default)]
pub struct ProgressMonitor {
    state: RwLock<ProgressSnapshot>,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.state.read().await.clone()
    }

    /// Applies one event; returns whether the snapshot changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(run) = ev.run else {
            return false;
        };
        let mut st = self.state.write().await;

        if let EventKind::Started { .. } = ev.kind {
            if st.run.is_some_and(|cur| cur > run) {
                return false;
            }
            *st = ProgressSnapshot {
                run: Some(run),
                ..ProgressSnapshot::default()
            };
            return true;
        }
        if st.run != Some(run) || st.is_finished() {
            return false;
        }

        match &ev.kind {
            EventKind::Progress {
                iteration,
                max_iteration,
                elapsed,
                eta,
            } => {
                st.iteration = st.iteration.max(*iteration);
                st.max_iteration = st.max_iteration.max(*max_iteration);
                st.elapsed = *elapsed;
                st.eta = *eta;
                true
            }
            EventKind::PhaseChanged { label } => {
                st.phase = Some(label.to_string());
                true
            }
            EventKind::Finished {
                outcome, elapsed, ..
            } => {
                st.elapsed = *elapsed;
                st.eta = None;
                st.outcome = Some(outcome.clone());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Subscribe for ProgressMonitor {
    async fn on_event(&self, ev: &Event) {
        self.update(ev).await;
    }

    fn name(&self) -> &'static str {
        "ProgressMonitor"
    }
}
