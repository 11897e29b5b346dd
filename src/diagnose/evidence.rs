//! # Heuristic evidence from captured output.
//!
//! [`EvidenceScanner::scan`] walks the run's output buffer once and collects:
//! - **evidence lines**: lines matching the failure vocabulary, bounded;
//! - **signatures**: known failure messages (geometry file missing, NaN, ...),
//!   each reported at most once with its own reason and fixes;
//! - **hints**: content heuristics about the output as a whole.
//!
//! Everything here is best-effort context. The exit-code classification stays
//! authoritative; see [`DiagnosticReport`](super::DiagnosticReport).

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Known failure message found in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    GeometryMissing,
    FileMissing,
    AdeTauInvalid,
    MaskUpdateFailed,
    SegmentationFault,
    OutOfMemory,
    NanDetected,
    Divergence,
    NotFound,
    PermissionDenied,
}

impl SignatureKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            SignatureKind::GeometryMissing => "geometry_missing",
            SignatureKind::FileMissing => "file_missing",
            SignatureKind::AdeTauInvalid => "ade_tau_invalid",
            SignatureKind::MaskUpdateFailed => "mask_update_failed",
            SignatureKind::SegmentationFault => "segfault",
            SignatureKind::OutOfMemory => "oom",
            SignatureKind::NanDetected => "nan_detected",
            SignatureKind::Divergence => "divergence",
            SignatureKind::NotFound => "not_found",
            SignatureKind::PermissionDenied => "permission_denied",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SignatureKind::GeometryMissing => {
                "The geometry .dat file could not be found at the expected path."
            }
            SignatureKind::FileMissing => "A required input file could not be opened.",
            SignatureKind::AdeTauInvalid => {
                "The computed ADE relaxation time (tau) is outside the stable range (0.5, 2.0)."
            }
            SignatureKind::MaskUpdateFailed => {
                "The CA biofilm mask update failed; geometry and material numbers are inconsistent."
            }
            SignatureKind::SegmentationFault => "The solver accessed invalid memory.",
            SignatureKind::OutOfMemory => "The system ran out of memory during the simulation.",
            SignatureKind::NanDetected => {
                "NaN or Inf values appeared; the simulation is diverging."
            }
            SignatureKind::Divergence => {
                "Residuals are increasing instead of decreasing; the solver is diverging."
            }
            SignatureKind::NotFound => "A required resource was not found.",
            SignatureKind::PermissionDenied => {
                "The solver does not have permission to read or write a file."
            }
        }
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            SignatureKind::GeometryMissing => &[
                "Copy the geometry .dat file into the project's input/ folder.",
                "Make sure the geometry filename in the domain settings matches the file on disk.",
                "The solver looks for <working_directory>/input/<geometry_filename>.",
            ],
            SignatureKind::FileMissing => &[
                "Check the console output for the exact filename.",
                "Verify the file exists in the project's input/ directory.",
                "Check file permissions; the file may be locked by another program.",
            ],
            SignatureKind::AdeTauInvalid => &[
                "Reduce the Peclet number or adjust delta_P.",
                "Check diffusion coefficients; very small values push tau out of range.",
                "Increase grid spacing (dx) to bring tau into range.",
            ],
            SignatureKind::MaskUpdateFailed => &[
                "Verify material numbers in the geometry file match the microbe material_number settings.",
                "Check that pore, solid and bounce-back numbers match the geometry convention.",
                "Ensure every microbe material number exists in the geometry file.",
            ],
            SignatureKind::SegmentationFault => &[
                "Check first that the geometry .dat file holds exactly nx * ny * nz values for the configured domain.",
                "Check for corrupt or truncated geometry files.",
            ],
            SignatureKind::OutOfMemory => &[
                "Reduce the domain size (nx, ny, nz) or close other programs to free memory.",
                "For large domains, use MPI parallelism to distribute memory.",
            ],
            SignatureKind::NanDetected => &[
                "Increase the relaxation time tau (try 0.8 or higher).",
                "Reduce the pressure drop (delta_P).",
                "Check boundary conditions and initial concentrations for unphysical values.",
            ],
            SignatureKind::Divergence => &[
                "Increase tau for better stability.",
                "Reduce the pressure drop (delta_P) to lower the Reynolds number.",
                "Check boundary conditions for consistency.",
            ],
            SignatureKind::NotFound => &[
                "Check the console output for the specific file or resource name.",
                "Verify all input files are in the correct directories.",
            ],
            SignatureKind::PermissionDenied => &[
                "Close any programs that might have the file open.",
                "Check that the output/ directory is writable.",
            ],
        }
    }
}

/// A signature and the first line that matched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    pub kind: SignatureKind,
    pub line: String,
}

/// Whole-output heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    /// Output mentions "geometry" together with "error"/"fail".
    GeometryMismatch,
    /// Fewer lines than the short-output threshold were produced.
    ShortOutput { lines: usize },
    /// The run went through an MPI launcher.
    ParallelRun,
}

impl Hint {
    pub fn as_label(&self) -> &'static str {
        match self {
            Hint::GeometryMismatch => "geometry_mismatch",
            Hint::ShortOutput { .. } => "short_output",
            Hint::ParallelRun => "parallel_run",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Hint::GeometryMismatch => {
                "The output reports a geometry problem; the voxel count may not match the domain dimensions.".to_string()
            }
            Hint::ShortOutput { lines } => {
                format!("The solver produced only {lines} line(s) of output; it likely crashed immediately.")
            }
            Hint::ParallelRun => "The run used an MPI launcher.".to_string(),
        }
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Hint::GeometryMismatch => &[
                "Count the values in the geometry file, then set nx, ny, nz to match.",
            ],
            Hint::ShortOutput { .. } => &[
                "Run the solver from the command line in the project directory for more detail.",
            ],
            Hint::ParallelRun => &["Try running without MPI (single core) to isolate the problem."],
        }
    }
}

/// Everything the scanner found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    /// Failure-vocabulary lines, trimmed, in output order.
    pub lines: Vec<String>,
    pub signatures: Vec<SignatureMatch>,
    pub hints: Vec<Hint>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.signatures.is_empty() && self.hints.is_empty()
    }
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

static KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    ci(r"error|failed|could not|not found|invalid|mismatch|terminating|exception")
});

static GEOMETRY: LazyLock<Regex> = LazyLock::new(|| ci(r"geometry"));
static ERROR_OR_FAIL: LazyLock<Regex> = LazyLock::new(|| ci(r"error|fail"));

// Order matters: a line is attributed to the first signature it matches.
static SIGNATURES: LazyLock<Vec<(Regex, SignatureKind)>> = LazyLock::new(|| {
    vec![
        (ci(r"error:\s*could not open geometry file"), SignatureKind::GeometryMissing),
        (ci(r"error:\s*could not open\s+\S"), SignatureKind::FileMissing),
        (ci(r"\[ADE\]\s*ERROR:\s*tau\s*=\s*[0-9.eE+-]+\s*invalid"), SignatureKind::AdeTauInvalid),
        (ci(r"error:\s*updating mask failed"), SignatureKind::MaskUpdateFailed),
        (ci(r"segmentation fault"), SignatureKind::SegmentationFault),
        (ci(r"out of memory|not enough memory|bad_alloc"), SignatureKind::OutOfMemory),
        (ci(r"\b(?:nan|inf)\b"), SignatureKind::NanDetected),
        (ci(r"diverg"), SignatureKind::Divergence),
        (ci(r"not found"), SignatureKind::NotFound),
        (ci(r"permission denied"), SignatureKind::PermissionDenied),
    ]
});

/// Single-pass scanner over the output buffer.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceScanner {
    /// Maximum number of evidence lines kept.
    pub max_evidence_lines: usize,
    /// Output with fewer lines than this yields [`Hint::ShortOutput`].
    pub short_output_lines: usize,
}

impl Default for EvidenceScanner {
    fn default() -> Self {
        Self {
            max_evidence_lines: 10,
            short_output_lines: 5,
        }
    }
}

impl EvidenceScanner {
    pub fn new(max_evidence_lines: usize, short_output_lines: usize) -> Self {
        Self {
            max_evidence_lines,
            short_output_lines,
        }
    }

    /// Scans `output`; `parallel` is whether the run went through an MPI launcher.
    pub fn scan<'a, I>(&self, output: I, parallel: bool) -> Evidence
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ev = Evidence::default();
        let mut total = 0usize;
        let mut geometry_trouble = false;

        for line in output {
            total += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if ev.lines.len() < self.max_evidence_lines && KEYWORDS.is_match(trimmed) {
                ev.lines.push(trimmed.to_string());
            }

            if !geometry_trouble && GEOMETRY.is_match(trimmed) && ERROR_OR_FAIL.is_match(trimmed) {
                geometry_trouble = true;
            }

            if let Some((_, kind)) = SIGNATURES.iter().find(|(re, _)| re.is_match(trimmed)) {
                if !ev.signatures.iter().any(|m| m.kind == *kind) {
                    ev.signatures.push(SignatureMatch {
                        kind: *kind,
                        line: trimmed.to_string(),
                    });
                }
            }
        }

        if geometry_trouble {
            ev.hints.push(Hint::GeometryMismatch);
        }
        if total < self.short_output_lines {
            ev.hints.push(Hint::ShortOutput { lines: total });
        }
        if parallel {
            ev.hints.push(Hint::ParallelRun);
        }
        ev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(lines: &[&str]) -> Evidence {
        EvidenceScanner::default().scan(lines.iter().copied(), false)
    }

    #[test]
    fn keyword_lines_are_bounded() {
        let lines: Vec<String> = (0..25).map(|i| format!("Error {i}: boom")).collect();
        let ev = EvidenceScanner::new(10, 5).scan(lines.iter().map(String::as_str), false);
        assert_eq!(ev.lines.len(), 10);
        assert_eq!(ev.lines[0], "Error 0: boom");
        assert_eq!(ev.lines[9], "Error 9: boom");
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let ev = scan(&["MISMATCH in dims", "all good", "Terminating rank 0", "x", "y"]);
        assert_eq!(ev.lines, vec!["MISMATCH in dims", "Terminating rank 0"]);
    }

    #[test]
    fn geometry_missing_wins_over_generic_file_missing() {
        let ev = scan(&[
            "Error: could not open geometry file input/geo.dat",
            "Error: could not open input/kinetics.txt",
            "a",
            "b",
            "c",
        ]);
        let kinds: Vec<_> = ev.signatures.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![SignatureKind::GeometryMissing, SignatureKind::FileMissing]);
        assert!(ev.hints.contains(&Hint::GeometryMismatch));
    }

    #[test]
    fn signatures_are_reported_once() {
        let ev = scan(&[
            "NS residual = nan",
            "ADE residual = inf",
            "diverging at iT = 10",
            "still diverging",
            "x",
        ]);
        let kinds: Vec<_> = ev.signatures.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![SignatureKind::NanDetected, SignatureKind::Divergence]);
        assert_eq!(ev.signatures[0].line, "NS residual = nan");
    }

    #[test]
    fn nan_needs_word_boundaries() {
        let ev = scan(&["financial infrastructure", "b", "c", "d", "e"]);
        assert!(ev.signatures.is_empty());
    }

    #[test]
    fn short_output_and_parallel_hints() {
        let ev = EvidenceScanner::default().scan(["only one line"], true);
        assert_eq!(ev.hints, vec![Hint::ShortOutput { lines: 1 }, Hint::ParallelRun]);

        let ev = EvidenceScanner::default().scan(std::iter::empty(), false);
        assert_eq!(ev.hints, vec![Hint::ShortOutput { lines: 0 }]);
    }

    #[test]
    fn quiet_healthy_output_has_no_evidence() {
        let ev = scan(&["iT = 1", "iT = 2", "iT = 3", "iT = 4", "iT = 5", "done"]);
        assert!(ev.is_empty());
    }
}
