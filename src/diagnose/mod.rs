//! Failure diagnostics: exit-code classification and output evidence.
//!
//! - [`classify`] authoritative, pure exit-code lookup
//! - [`EvidenceScanner`] best-effort scan of captured output
//! - [`DiagnosticReport`] both merged into one ranked, deduplicated report

mod evidence;
mod exit_code;
mod report;

pub use evidence::{Evidence, EvidenceScanner, Hint, SignatureKind, SignatureMatch};
pub use exit_code::{
    Classification, ExitCategory, ExitCodeInfo, classify, lookup, to_signed32,
};
pub use report::{DiagnosticReport, Suggestion, SuggestionSource};
