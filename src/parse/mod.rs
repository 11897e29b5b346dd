//! Best-effort structured extraction from the solver's unstructured output.
//!
//! - [`OutputParser`] the ordered rule chain applied to every line
//! - [`ParseState`] iteration/phase state carried across lines of one run
//! - [`LineSignal`] facts derived from a line (turned into events by the run worker)
//!
//! Unmatched lines, partial matches and malformed numbers are never errors.

mod parser;
mod patterns;
mod state;

pub use parser::{LineSignal, OutputParser, Rule, RuleFn, default_rules};
pub use state::ParseState;
