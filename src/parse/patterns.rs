//! Compiled patterns for the solver's free-text log lines.
//!
//! The solver prints unstructured logging, not a protocol. Every pattern here is
//! matched with `search` semantics and must tolerate surrounding noise.

use std::sync::LazyLock;

use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// `iT = 4200`. The word boundary keeps `ade_max_iT = ...` out.
pub(crate) static ITERATION_IT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\biT\s*=\s*(\d+)"));

/// `Iteration: 12`, `iter=12`, `step 12/500`.
pub(crate) static ITERATION_WORD: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:iteration|iter|step)\s*[:=]?\s*(\d+)(?:\s*/\s*(\d+))?")
});

/// `ade_max_iT = 50000` (configuration echo).
pub(crate) static ADE_MAX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"ade_max_iT\s*=\s*(\d+)"));

/// `ns_max_iT1 = 20000`, `ns_max_iT = 20000` (configuration echo).
pub(crate) static NS_MAX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"ns_max_iT\d?\s*=\s*(\d+)"));

// The numeric capture is deliberately loose (`3e` is captured); parsing decides.
pub(crate) static NS_RESIDUAL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\bNS[:\s].*?(?:residual|converge|error)\s*=\s*([0-9]+\.?[0-9]*[eE]?[+-]?[0-9]*)")
});

pub(crate) static ADE_RESIDUAL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\bADE[:\s].*?(?:residual|converge|error)\s*=\s*([0-9]+\.?[0-9]*[eE]?[+-]?[0-9]*)")
});

/// `==== Phase 2: reactive transport ====`, `-- Running NS solver`.
pub(crate) static PHASE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)^[-=]{2,}\s*(?:Phase\s+\d+|Step\s+\d+|Running|Starting|Initializ)")
});
