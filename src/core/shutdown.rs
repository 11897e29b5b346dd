//! # OS signals that should stop a run.
//!
//! A terminal user hitting Ctrl-C (or a batch scheduler sending SIGTERM to the
//! front-end) expects the solver to stop too. The solver runs in its own
//! process group, so it does not receive those signals itself;
//! [`cancel_on_signal`] turns them into [`Supervisor::cancel`] calls.
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Windows:** Ctrl-C.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::supervisor::Supervisor;

/// Signal that ended [`wait_for_shutdown_signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl ShutdownSignal {
    /// Conventional shell exit status for a process stopped by this signal.
    pub fn exit_status(self) -> u8 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
            ShutdownSignal::Quit => 131,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Quit => "SIGQUIT",
        })
    }
}

/// Waits for the next termination signal.
///
/// # Errors
/// Fails if the signal handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let sig = tokio::select! {
        _ = sigint.recv()  => ShutdownSignal::Interrupt,
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigquit.recv() => ShutdownSignal::Quit,
    };
    Ok(sig)
}

/// Waits for the next termination signal.
///
/// # Errors
/// Fails if the Ctrl-C handler cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}

/// Spawns a task that cancels the active run of `sup` on the first
/// termination signal and returns that signal.
///
/// Resolves to `None` if the handlers cannot be installed. Abort the handle to
/// stop listening.
pub fn cancel_on_signal(sup: Arc<Supervisor>) -> JoinHandle<Option<ShutdownSignal>> {
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(sig) => {
                info!(signal = %sig, run = ?sup.active_run(), "termination signal received");
                sup.cancel();
                Some(sig)
            }
            Err(e) => {
                warn!(error = %e, "cannot install signal handlers");
                None
            }
        }
    })
}
