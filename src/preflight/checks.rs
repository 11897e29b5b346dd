//! Built-in checks, in the order they run.
//!
//! ```text
//! executable ─► working dir ─► CompLaB.xml ─► input/ ─► geometry ─► output/ ─► validators
//!   (stop)        (stop)
//! ```
//! A missing executable or project directory makes every later check
//! meaningless, so those two return early.

use std::fs;

use tracing::debug;

use super::geometry::validate_geometry;
use super::{IssueKind, PreflightIssue};
use crate::core::RunRequest;
use crate::locate::is_executable;

/// Runs every check against `req` and returns all findings.
///
/// Side effect: creates `<working_directory>/output` when missing.
pub fn run_preflight(req: &RunRequest) -> Vec<PreflightIssue> {
    let mut issues = Vec::new();
    let exe = &req.executable_path;

    if !is_executable(exe) {
        let error = if exe.is_file() {
            format!("Executable is not runnable: {}", exe.display())
        } else {
            format!("Executable not found: {}", exe.display())
        };
        issues.push(
            PreflightIssue::blocking(
                IssueKind::ExecutableNotFound,
                error,
                "The CompLaB solver executable does not exist at the configured path or lacks execute permission.",
            )
            .with_path(exe)
            .suggest("Set the correct path to the solver executable.")
            .suggest(format!(
                "Or point the {} environment variable at it.",
                crate::locate::ENV_EXECUTABLE
            ))
            .suggest("If the executable was moved, update the configured path."),
        );
        return issues;
    }

    let cwd = &req.working_directory;
    if !cwd.is_dir() {
        issues.push(
            PreflightIssue::blocking(
                IssueKind::WorkingDirNotFound,
                format!("Working directory does not exist: {}", cwd.display()),
                "The project directory could not be found on disk.",
            )
            .with_path(cwd)
            .suggest("Save the project first to create the project directory.")
            .suggest("If the project folder was moved, re-open it from the new location."),
        );
        return issues;
    }

    let xml = req.xml_path();
    if !xml.is_file() {
        issues.push(
            PreflightIssue::blocking(
                IssueKind::ConfigNotFound,
                format!("CompLaB.xml not found: {}", xml.display()),
                "The solver configuration file was not exported to the project directory.",
            )
            .with_path(&xml)
            .suggest("Export CompLaB.xml from the project before running.")
            .suggest("Save the project and try running again."),
        );
    }

    let input_dir = req.input_dir();
    let has_input = input_dir.is_dir();
    if !has_input {
        issues.push(
            PreflightIssue::blocking(
                IssueKind::InputDirNotFound,
                format!("Input directory missing: {}", input_dir.display()),
                "The solver expects an 'input' folder inside the project directory.",
            )
            .with_path(&input_dir)
            .suggest(format!("Create the folder: {}", input_dir.display()))
            .suggest("Copy the geometry .dat file into this input/ folder."),
        );
    }

    if let Some(domain) = &req.domain {
        if domain.geometry_file.trim().is_empty() {
            issues.push(
                PreflightIssue::blocking(
                    IssueKind::GeometryUnspecified,
                    "No geometry file specified.",
                    "The domain settings do not name a geometry .dat file.",
                )
                .suggest("Set the geometry filename in the domain settings."),
            );
        } else if has_input {
            let geom = input_dir.join(&domain.geometry_file);
            if geom.is_file() {
                issues.extend(validate_geometry(&geom, domain));
            } else {
                issues.push(
                    PreflightIssue::blocking(
                        IssueKind::GeometryNotFound,
                        format!("Geometry file not found: {}", geom.display()),
                        format!(
                            "The geometry file '{}' does not exist in the input/ folder; \
                             the solver would crash when reading it.",
                            domain.geometry_file
                        ),
                    )
                    .with_path(&geom)
                    .suggest(format!("Copy the geometry .dat file to: {}", geom.display()))
                    .suggest("Or change the geometry filename in the domain settings to match an existing file."),
                );
            }
        }
    }

    let output_dir = req.output_dir();
    if !output_dir.is_dir() {
        match fs::create_dir_all(&output_dir) {
            Ok(()) => debug!(path = %output_dir.display(), "created output directory"),
            Err(e) => issues.push(
                PreflightIssue::warning(
                    IssueKind::OutputDirUnavailable,
                    format!("Cannot create output directory: {}", output_dir.display()),
                    format!("Failed to create the output folder: {e}"),
                )
                .with_path(&output_dir)
                .suggest("Check disk space and folder permissions.")
                .suggest(format!("Create the folder manually: {}", output_dir.display())),
            ),
        }
    }

    for v in &req.validators {
        issues.extend(v.validate(req));
    }

    issues
}
