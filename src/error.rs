//! Error types returned when a run cannot be started.
//!
//! [`RunError`] covers everything that stops an attempt before the solver is
//! running: pre-flight findings, launch failures and supervisor misuse.
//! Failures of a *running* solver are not errors here; they end the run with a
//! [`RunOutcome`](crate::RunOutcome) and a diagnostic report.
//!
//! Like the rest of the crate, errors provide `as_label` (stable, for logs) and
//! `as_message` (human-readable).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::preflight::{IssueKind, PreflightIssue, first_blocking};

/// # Errors produced when starting a run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// The solver executable is missing or not executable.
    #[error("executable not found: {path}")]
    ExecutableNotFound {
        /// Configured executable path.
        path: PathBuf,
    },

    /// The project directory does not exist.
    #[error("working directory not found: {path}")]
    WorkingDirNotFound {
        /// Configured working directory.
        path: PathBuf,
    },

    /// `CompLaB.xml` (or the configured XML) does not exist.
    #[error("CompLaB.xml not found: {path}")]
    ConfigNotFound {
        /// Resolved configuration path.
        path: PathBuf,
    },

    /// Other blocking pre-flight findings (input folder, geometry, validators).
    #[error("pre-flight check failed: {} blocking issue(s)", blocking_count(.issues))]
    Preflight {
        /// Every finding, warnings included.
        issues: Vec<PreflightIssue>,
    },

    /// The OS refused to start the process.
    #[error("spawn failed: {reason}")]
    SpawnFailed {
        /// OS error text.
        reason: String,
    },

    /// The process did not reach a running state in time.
    #[error("process did not start within {timeout:?}")]
    StartTimeout {
        /// The configured start timeout.
        timeout: Duration,
    },

    /// This supervisor already has an active run.
    #[error("a run is already active")]
    AlreadyRunning,
}

fn blocking_count(issues: &[PreflightIssue]) -> usize {
    issues.iter().filter(|i| i.is_blocking()).count()
}

impl RunError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use simvisor::RunError;
    ///
    /// let err = RunError::SpawnFailed { reason: "permission denied".into() };
    /// assert_eq!(err.as_label(), "spawn_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::ExecutableNotFound { .. } => "executable_not_found",
            RunError::WorkingDirNotFound { .. } => "working_dir_not_found",
            RunError::ConfigNotFound { .. } => "config_not_found",
            RunError::Preflight { .. } => "preflight_failed",
            RunError::SpawnFailed { .. } => "spawn_failed",
            RunError::StartTimeout { .. } => "start_timeout",
            RunError::AlreadyRunning => "already_running",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RunError::ExecutableNotFound { path } => {
                format!("Executable not found: {}", path.display())
            }
            RunError::WorkingDirNotFound { path } => {
                format!("Working directory does not exist: {}", path.display())
            }
            RunError::ConfigNotFound { path } => format!("CompLaB.xml not found: {}", path.display()),
            RunError::Preflight { issues } => match first_blocking(issues) {
                Some(first) => format!("Pre-flight check failed: {}", first.error),
                None => "Pre-flight check failed".to_string(),
            },
            RunError::SpawnFailed { reason } => format!("Failed to start the solver: {reason}"),
            RunError::StartTimeout { timeout } => {
                format!("The solver did not start within {timeout:?}")
            }
            RunError::AlreadyRunning => "A simulation is already running".to_string(),
        }
    }

    /// Maps pre-flight findings to an error; `None` when nothing blocks.
    ///
    /// The first blocking issue decides the variant, so a missing executable
    /// is reported as [`RunError::ExecutableNotFound`] rather than a generic
    /// pre-flight failure.
    pub fn from_preflight(issues: Vec<PreflightIssue>) -> Option<Self> {
        let first = first_blocking(&issues)?;
        let path = first.path.clone().unwrap_or_default();
        Some(match first.kind {
            IssueKind::ExecutableNotFound => RunError::ExecutableNotFound { path },
            IssueKind::WorkingDirNotFound => RunError::WorkingDirNotFound { path },
            IssueKind::ConfigNotFound => RunError::ConfigNotFound { path },
            _ => RunError::Preflight { issues },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_alone_do_not_block() {
        let issues = vec![PreflightIssue::warning(
            IssueKind::OutputDirUnavailable,
            "cannot create output",
            "read-only disk",
        )];
        assert!(RunError::from_preflight(issues).is_none());
    }

    #[test]
    fn test_first_blocking_issue_selects_variant() {
        let issues = vec![
            PreflightIssue::warning(IssueKind::Custom, "w", "w"),
            PreflightIssue::blocking(IssueKind::ConfigNotFound, "no xml", "r")
                .with_path("/p/CompLaB.xml"),
            PreflightIssue::blocking(IssueKind::InputDirNotFound, "no input", "r"),
        ];
        let err = RunError::from_preflight(issues).unwrap();
        assert_eq!(err.as_label(), "config_not_found");
        assert!(matches!(err, RunError::ConfigNotFound { ref path } if path.ends_with("CompLaB.xml")));
    }

    #[test]
    fn test_other_blocking_issues_become_preflight() {
        let issues = vec![PreflightIssue::blocking(IssueKind::GeometryContent, "size mismatch", "r")];
        let err = RunError::from_preflight(issues).unwrap();
        assert_eq!(err.as_label(), "preflight_failed");
        assert_eq!(err.as_message(), "Pre-flight check failed: size mismatch");
        assert_eq!(err.to_string(), "pre-flight check failed: 1 blocking issue(s)");
    }
}
