//! # Pre-spawn validation.
//!
//! [`run_preflight`] checks a [`RunRequest`](crate::RunRequest) before any
//! process exists, so failures are attributable ("CompLaB.xml not found")
//! instead of surfacing as a generic spawn error.
//!
//! Each finding is a [`PreflightIssue`] with a [`Severity`]. Any
//! [`Severity::Blocking`] issue ends the attempt; warnings are reported and
//! the run proceeds.
//!
//! Callers plug in their own checks (for example a project model that knows the
//! XML contents) through the [`Validate`] trait.

mod checks;
mod geometry;

use std::fmt;
use std::path::PathBuf;

pub use checks::run_preflight;
pub use geometry::{GeometryScan, scan_geometry, validate_geometry};

use crate::core::RunRequest;

/// Whether an issue stops the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Blocking,
    Warning,
}

/// What an issue is about.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    ExecutableNotFound,
    WorkingDirNotFound,
    ConfigNotFound,
    InputDirNotFound,
    GeometryUnspecified,
    GeometryNotFound,
    GeometryContent,
    OutputDirUnavailable,
    /// Raised by a caller-supplied [`Validate`].
    Custom,
}

impl IssueKind {
    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            IssueKind::ExecutableNotFound => "executable_not_found",
            IssueKind::WorkingDirNotFound => "working_dir_not_found",
            IssueKind::ConfigNotFound => "config_not_found",
            IssueKind::InputDirNotFound => "input_dir_not_found",
            IssueKind::GeometryUnspecified => "geometry_unspecified",
            IssueKind::GeometryNotFound => "geometry_not_found",
            IssueKind::GeometryContent => "geometry_content",
            IssueKind::OutputDirUnavailable => "output_dir_unavailable",
            IssueKind::Custom => "custom",
        }
    }
}

/// One pre-flight finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// One-line statement of the problem.
    pub error: String,
    pub reason: String,
    pub suggestions: Vec<String>,
    /// Offending path, when there is one.
    pub path: Option<PathBuf>,
}

impl PreflightIssue {
    pub fn blocking(kind: IssueKind, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(kind, Severity::Blocking, error.into(), reason.into())
    }

    pub fn warning(kind: IssueKind, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, error.into(), reason.into())
    }

    fn new(kind: IssueKind, severity: Severity, error: String, reason: String) -> Self {
        Self {
            kind,
            severity,
            error,
            reason,
            suggestions: Vec::new(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }

    /// Plain-text block published in a `Diagnostic` event.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PreflightIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match self.severity {
            Severity::Blocking => "PRE-FLIGHT ERROR",
            Severity::Warning => "PRE-FLIGHT WARNING",
        };
        writeln!(f, "------------------------------------------------------------")?;
        writeln!(f, "  {head}: {}", self.error)?;
        writeln!(f, "  Reason: {}", self.reason)?;
        if !self.suggestions.is_empty() {
            writeln!(f, "  How to fix:")?;
            for (i, s) in self.suggestions.iter().enumerate() {
                writeln!(f, "    {}. {s}", i + 1)?;
            }
        }
        write!(f, "------------------------------------------------------------")
    }
}

/// Caller-supplied configuration check, run after the built-in checks.
///
/// ```rust
/// use simvisor::RunRequest;
/// use simvisor::preflight::{IssueKind, PreflightIssue, Validate};
///
/// struct NeedsTwoCores;
///
/// impl Validate for NeedsTwoCores {
///     fn validate(&self, req: &RunRequest) -> Vec<PreflightIssue> {
///         match &req.parallel {
///             Some(p) if p.core_count >= 2 => vec![],
///             _ => vec![PreflightIssue::warning(
///                 IssueKind::Custom,
///                 "running on a single core",
///                 "this model is slow without MPI",
///             )],
///         }
///     }
/// }
/// ```
pub trait Validate: Send + Sync + 'static {
    fn validate(&self, req: &RunRequest) -> Vec<PreflightIssue>;
}

/// Returns the first blocking issue, if any.
pub fn first_blocking(issues: &[PreflightIssue]) -> Option<&PreflightIssue> {
    issues.iter().find(|i| i.is_blocking())
}
