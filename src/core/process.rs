//! # Handle to the running solver.
//!
//! [`SolverProcess`] is the seam between the run worker and the OS process.
//! [`ChildProcess`] is the real implementation; tests substitute fakes.
//!
//! ## Termination
//! ```text
//! request_terminate ──► wait(grace) ──► exited? ── yes ──► done
//!                                          │
//!                                          no
//!                                          ▼
//!                                     force_kill ──► wait
//! ```
//! On Unix the child leads its own process group. The terminate request is a
//! SIGTERM to the group, which reaches MPI ranks started by the launcher.
//! Elsewhere both steps kill the process.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::time;
use tracing::{debug, warn};

/// Upper bound on the wait after a forced kill.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Operations the run worker needs from the solver process.
#[async_trait]
pub trait SolverProcess: Send {
    /// OS process id, when known.
    fn id(&self) -> Option<u32>;

    /// Asks the process to exit. Non-blocking.
    fn request_terminate(&mut self) -> io::Result<()>;

    /// Kills the process (and its group). Never fails.
    async fn force_kill(&mut self);

    /// Waits for exit and returns the exit code.
    ///
    /// Must be cancel-safe: the worker polls it inside `select!`.
    async fn wait(&mut self) -> io::Result<i64>;
}

/// Real solver process.
pub struct ChildProcess {
    child: Child,
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl ChildProcess {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            #[cfg(unix)]
            pgid: child
                .id()
                .and_then(|id| i32::try_from(id).ok())
                .map(nix::unistd::Pid::from_raw),
            child,
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, sig: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;

        let Some(pgid) = self.pgid else {
            return Ok(());
        };
        match nix::sys::signal::killpg(pgid, sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

/// Maps an exit status to an integer code; a Unix signal `n` becomes `-n`.
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i64 {
    if let Some(code) = status.code() {
        return i64::from(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -i64::from(sig);
        }
    }
    -1
}

#[async_trait]
impl SolverProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn request_terminate(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGTERM)
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    async fn force_kill(&mut self) {
        #[cfg(unix)]
        if let Err(e) = self.signal_group(nix::sys::signal::Signal::SIGKILL) {
            debug!(error = %e, "killpg failed");
        }
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "start_kill failed");
        }
    }

    async fn wait(&mut self) -> io::Result<i64> {
        self.child.wait().await.map(exit_code_of)
    }
}

/// Terminate, wait up to `grace`, then kill. Returns the exit code when one was observed.
pub(crate) async fn terminate_with_grace<P>(proc: &mut P, grace: Duration) -> Option<i64>
where
    P: SolverProcess + ?Sized,
{
    if let Err(e) = proc.request_terminate() {
        warn!(error = %e, pid = ?proc.id(), "terminate request failed");
    }
    match time::timeout(grace, proc.wait()).await {
        Ok(Ok(code)) => return Some(code),
        Ok(Err(e)) => warn!(error = %e, "wait after terminate failed"),
        Err(_elapsed) => debug!(?grace, pid = ?proc.id(), "grace elapsed, killing"),
    }
    proc.force_kill().await;
    match time::timeout(KILL_WAIT, proc.wait()).await {
        Ok(Ok(code)) => Some(code),
        _ => None,
    }
}
