//! Geometry file content validation.
//!
//! The geometry `.dat` file is whitespace-separated integer material codes,
//! `nx * ny * nz` of them. A count mismatch makes the solver read past its
//! arrays, so it is caught here with exact expected/actual numbers.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::{IssueKind, PreflightIssue};
use crate::core::DomainSpec;

const MAX_REPORTED: usize = 5;

/// Result of one pass over a geometry file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryScan {
    /// Integer tokens seen.
    pub values: u64,
    /// First few non-integer tokens as `(line_number, token)`.
    pub non_integer: Vec<(usize, String)>,
    pub non_integer_total: u64,
    /// First few distinct negative or unknown material numbers.
    pub bad_materials: Vec<i64>,
    pub bad_material_total: u64,
}

/// Streams `reader` once. `known` empty means any non-negative material is accepted.
pub fn scan_geometry<R: BufRead>(mut reader: R, known: &[i64]) -> io::Result<GeometryScan> {
    let mut scan = GeometryScan::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let line = String::from_utf8_lossy(&buf);

        for token in line.split_whitespace() {
            match token.parse::<i64>() {
                Ok(value) => {
                    scan.values += 1;
                    let bad = value < 0 || (!known.is_empty() && !known.contains(&value));
                    if bad {
                        scan.bad_material_total += 1;
                        if scan.bad_materials.len() < MAX_REPORTED
                            && !scan.bad_materials.contains(&value)
                        {
                            scan.bad_materials.push(value);
                        }
                    }
                }
                Err(_) => {
                    scan.non_integer_total += 1;
                    if scan.non_integer.len() < MAX_REPORTED {
                        scan.non_integer.push((line_no, token.to_string()));
                    }
                }
            }
        }
    }
    Ok(scan)
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Checks the geometry file at `path` against `domain`.
///
/// Read failures are reported as warnings; the solver gets the final say.
pub fn validate_geometry(path: &Path, domain: &DomainSpec) -> Vec<PreflightIssue> {
    let (nx, ny, nz) = (domain.nx, domain.ny, domain.nz);
    let mut issues = Vec::new();

    if nx == 0 || ny == 0 || nz == 0 {
        issues.push(
            PreflightIssue::blocking(
                IssueKind::GeometryContent,
                format!("Invalid domain dimensions: nx={nx}, ny={ny}, nz={nz}."),
                "All domain dimensions must be greater than zero.",
            )
            .suggest("Set nx, ny and nz in the domain settings."),
        );
        return issues;
    }
    let Some(expected) = nx.checked_mul(ny).and_then(|v| v.checked_mul(nz)) else {
        issues.push(PreflightIssue::blocking(
            IssueKind::GeometryContent,
            format!("Domain too large: nx={nx} x ny={ny} x nz={nz} overflows."),
            "The domain size cannot be represented.",
        ));
        return issues;
    };

    let scan = match File::open(path).and_then(|f| scan_geometry(BufReader::new(f), &domain.materials)) {
        Ok(scan) => scan,
        Err(e) => {
            issues.push(
                PreflightIssue::warning(
                    IssueKind::GeometryContent,
                    format!("Could not read geometry file: {}", path.display()),
                    format!("The geometry content check was skipped: {e}"),
                )
                .with_path(path),
            );
            return issues;
        }
    };

    if !scan.non_integer.is_empty() {
        let mut issue = PreflightIssue::blocking(
            IssueKind::GeometryContent,
            format!(
                "Geometry file contains {} non-integer value(s).",
                thousands(scan.non_integer_total)
            ),
            "The geometry .dat file must contain only integer material numbers \
             (0=solid, 1=bounce-back, 2=pore, 3+=biomass).",
        )
        .with_path(path)
        .suggest("Fix the following entries in the geometry file:");
        for (line, token) in &scan.non_integer {
            issue = issue.suggest(format!("  Line {line}: '{token}'"));
        }
        issues.push(issue.suggest("Each value must be a non-negative integer."));
    }

    if !scan.bad_materials.is_empty() {
        let listed = scan
            .bad_materials
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let mut issue = PreflightIssue::blocking(
            IssueKind::GeometryContent,
            format!(
                "Geometry file contains {} out-of-range material number(s): {listed}.",
                thousands(scan.bad_material_total)
            ),
            "Material numbers must be non-negative and defined in the project settings.",
        )
        .with_path(path);
        if !domain.materials.is_empty() {
            let known = domain
                .materials
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            issue = issue.suggest(format!("Known material numbers: {known}."));
        }
        issues.push(issue.suggest("Fix the geometry file or add the missing materials to the project."));
    }

    if scan.values != expected {
        issues.push(
            PreflightIssue::blocking(
                IssueKind::GeometryContent,
                format!(
                    "Geometry size mismatch: file has {} values, expected {} (nx={nx} x ny={ny} x nz={nz}).",
                    thousands(scan.values),
                    thousands(expected)
                ),
                "The number of values in the geometry file must equal nx * ny * nz; \
                 a mismatch makes the solver read past its arrays (heap corruption, 0xC0000374).",
            )
            .with_path(path)
            .suggest(format!("The geometry file has {} values.", thousands(scan.values)))
            .suggest(format!(
                "The domain settings require {} values ({nx} x {ny} x {nz}).",
                thousands(expected)
            ))
            .suggest("Adjust nx, ny, nz to match the file, or regenerate the geometry file."),
        );
    }

    issues
}
