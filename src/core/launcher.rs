//! # Command-line construction and spawn.
//!
//! ```text
//! direct:   <exe> <xml>
//! parallel: <launcher> -np <N> <exe> <xml>       (core_count > 1)
//! ```
//!
//! stdout and stderr of the child share the write end of one OS pipe, so
//! interleaved writes reach the reader in the order the solver made them.
//! The parent's copies of the write end are dropped right after spawning;
//! EOF on the read end then means every process holding the pipe has exited.

use std::ffi::OsString;
use std::io::{self, PipeReader};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time;

use super::process::ChildProcess;
use super::request::RunRequest;
use crate::error::RunError;

/// Fully resolved invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl LaunchPlan {
    pub fn from_request(req: &RunRequest) -> Self {
        let exe = req.executable_path.clone().into_os_string();
        let xml = req.xml_argument().into_os_string();

        match &req.parallel {
            Some(p) if p.core_count > 1 => Self {
                program: OsString::from(&p.launcher_command),
                args: vec![
                    OsString::from("-np"),
                    OsString::from(p.core_count.to_string()),
                    exe,
                    xml,
                ],
                cwd: req.working_directory.clone(),
            },
            _ => Self {
                program: exe,
                args: vec![xml],
                cwd: req.working_directory.clone(),
            },
        }
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Space-joined command line for logs and `Started` events.
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn spawn_blocking_parts(plan: &LaunchPlan) -> io::Result<(Child, PipeReader)> {
    let (reader, writer) = io::pipe()?;
    let writer_err = writer.try_clone()?;

    let mut cmd = Command::new(&plan.program);
    cmd.args(&plan.args)
        .current_dir(&plan.cwd)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_err)
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    // Dropping the command closes the parent's write ends.
    drop(cmd);
    Ok((child, reader))
}

/// Spawns `plan`; returns the process handle and the merged output pipe.
pub(crate) async fn spawn(
    plan: &LaunchPlan,
    start_timeout: Option<Duration>,
) -> Result<(ChildProcess, PipeReader), RunError> {
    let owned = plan.clone();
    let task = tokio::task::spawn_blocking(move || spawn_blocking_parts(&owned));

    let joined = match start_timeout {
        Some(limit) => match time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_elapsed) => return Err(RunError::StartTimeout { timeout: limit }),
        },
        None => task.await,
    };

    match joined {
        Ok(Ok((child, reader))) => Ok((ChildProcess::new(child), reader)),
        Ok(Err(e)) => Err(RunError::SpawnFailed {
            reason: e.to_string(),
        }),
        Err(join) => Err(RunError::SpawnFailed {
            reason: format!("spawn task failed: {join}"),
        }),
    }
}
