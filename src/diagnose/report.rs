//! # Merged failure report.
//!
//! One [`DiagnosticReport`] per failed run. It combines the authoritative
//! [`Classification`] with the heuristic [`Evidence`] into a single ranked
//! suggestion list:
//!
//! ```text
//! classify(exit_code) ──► suggestions ─┐
//! signatures (output order) ───────────┼─► dedup ─► ranked list
//! hints ───────────────────────────────┘
//! ```
//!
//! Ranking follows authority: classifier first, then signatures, then hints.
//! A suggestion already present keeps its earlier (higher) rank.

use std::fmt::{self, Write as _};

use super::evidence::Evidence;
use super::exit_code::{Classification, classify};

const RULE_HEAVY: &str = "============================================================";
const RULE_LIGHT: &str = "------------------------------------------------------------";

const QUICK_CHECKLIST: &[&str] = &[
    "Geometry file exists in input/ folder?",
    "Geometry values count = nx * ny * nz?",
    "Domain dimensions (nx, ny, nz) set correctly?",
    "Material numbers in geometry match project settings?",
    "Relaxation time tau > 0.5?",
    "At least one substrate defined if chemistry is on?",
];

/// Where a ranked suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionSource {
    ExitCode,
    Signature,
    Hint,
}

/// One entry of the ranked list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: &'static str,
    pub source: SuggestionSource,
}

/// Classification plus supporting evidence for one failed run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub classification: Classification,
    pub evidence: Evidence,
    /// Deduplicated, ranked remediation list.
    pub suggestions: Vec<Suggestion>,
}

impl DiagnosticReport {
    /// Builds the report for `exit_code` from already-scanned evidence.
    pub fn build(exit_code: i64, evidence: Evidence) -> Self {
        let classification = classify(exit_code);
        let mut suggestions: Vec<Suggestion> = Vec::new();
        let mut push = |text: &'static str, source: SuggestionSource| {
            if !suggestions.iter().any(|s| s.text.eq_ignore_ascii_case(text)) {
                suggestions.push(Suggestion { text, source });
            }
        };

        for &s in classification.suggestions() {
            push(s, SuggestionSource::ExitCode);
        }
        for m in &evidence.signatures {
            for &s in m.kind.suggestions() {
                push(s, SuggestionSource::Signature);
            }
        }
        for h in &evidence.hints {
            for &s in h.suggestions() {
                push(s, SuggestionSource::Hint);
            }
        }

        Self {
            classification,
            evidence,
            suggestions,
        }
    }

    pub fn exit_code(&self) -> i64 {
        self.classification.exit_code
    }

    /// Renders the plain-text report published in `Diagnostic` events.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> fmt::Result {
        let c = &self.classification;
        writeln!(out, "{RULE_HEAVY}")?;
        writeln!(out, "  ERROR DIAGNOSTIC REPORT")?;
        writeln!(out, "{RULE_HEAVY}")?;
        writeln!(out)?;
        writeln!(out, "  Exit Code: {}", c.exit_code)?;
        if let Some(hex) = c.hex() {
            writeln!(out, "  (Hex: {hex})")?;
        }
        writeln!(out, "  Error Type: {}", c.title())?;
        writeln!(out)?;
        writeln!(out, "  REASON: {}", c.description())?;

        if !self.suggestions.is_empty() {
            writeln!(out)?;
            writeln!(out, "  SUGGESTED FIXES:")?;
            for (i, s) in self.suggestions.iter().enumerate() {
                writeln!(out, "    {}. {}", i + 1, s.text)?;
            }
        }

        if !self.evidence.signatures.is_empty() {
            writeln!(out)?;
            writeln!(out, "{RULE_LIGHT}")?;
            writeln!(out, "  DETECTED IN SOLVER OUTPUT:")?;
            for m in &self.evidence.signatures {
                writeln!(out)?;
                writeln!(out, "  >> {}", m.line)?;
                writeln!(out, "     Reason: {}", m.kind.reason())?;
            }
        }

        if !self.evidence.lines.is_empty() {
            writeln!(out)?;
            writeln!(out, "{RULE_LIGHT}")?;
            writeln!(out, "  RELEVANT OUTPUT:")?;
            for line in &self.evidence.lines {
                writeln!(out, "    {line}")?;
            }
        }

        if !self.evidence.hints.is_empty() {
            writeln!(out)?;
            writeln!(out, "{RULE_LIGHT}")?;
            writeln!(out, "  NOTES:")?;
            for h in &self.evidence.hints {
                writeln!(out, "    - {}", h.message())?;
            }
        }

        writeln!(out)?;
        writeln!(out, "{RULE_LIGHT}")?;
        writeln!(out, "  QUICK CHECKLIST:")?;
        for item in QUICK_CHECKLIST {
            writeln!(out, "    [ ] {item}")?;
        }
        write!(out, "{RULE_HEAVY}")
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::{EvidenceScanner, ExitCategory, Hint};

    #[test]
    fn classifier_suggestions_rank_first_and_dedup() {
        let output = [
            "Reading geometry",
            "std::bad_alloc: out of memory",
            "Segmentation fault (core dumped)",
        ];
        let ev = EvidenceScanner::default().scan(output, false);
        let report = DiagnosticReport::build(-11, ev);

        assert_eq!(report.classification.category(), ExitCategory::SegmentationFault);
        assert_eq!(report.suggestions[0].source, SuggestionSource::ExitCode);
        assert!(report.suggestions[0].text.contains("nx * ny * nz"));

        let mut texts: Vec<_> = report.suggestions.iter().map(|s| s.text).collect();
        let before = texts.len();
        texts.sort();
        texts.dedup();
        assert_eq!(texts.len(), before);

        let first_hint = report
            .suggestions
            .iter()
            .position(|s| s.source == SuggestionSource::Hint)
            .unwrap();
        let last_sig = report
            .suggestions
            .iter()
            .rposition(|s| s.source == SuggestionSource::Signature)
            .unwrap();
        assert!(last_sig < first_hint);
    }

    #[test]
    fn render_contains_all_sections() {
        let output = [
            "Error: could not open geometry file input/geo.dat",
            "terminating",
        ];
        let ev = EvidenceScanner::default().scan(output, true);
        assert!(ev.hints.contains(&Hint::ParallelRun));
        let text = DiagnosticReport::build(1, ev).render();

        assert!(text.contains("Exit Code: 1"));
        assert!(text.contains("Configuration / File Error"));
        assert!(text.contains("SUGGESTED FIXES:"));
        assert!(text.contains(">> Error: could not open geometry file input/geo.dat"));
        assert!(text.contains("RELEVANT OUTPUT:"));
        assert!(text.contains("QUICK CHECKLIST:"));
        assert!(text.contains("without MPI"));
    }

    #[test]
    fn unsigned_windows_code_renders_hex() {
        let report = DiagnosticReport::build(3221225477, Evidence::default());
        let text = report.to_string();
        assert!(text.contains("(Hex: 0xC0000005)"));
        assert!(text.contains("Access Violation"));
    }
}
