//! # Ordered rule chain over solver output lines.
//!
//! [`OutputParser`] evaluates every line against a fixed list of [`Rule`]s.
//! Each rule is a plain function from line text plus mutable [`ParseState`] to
//! zero or more [`LineSignal`]s. Several rules may fire on the same line; the
//! parser never filters lines and never fails.
//!
//! ## Default chain
//! ```text
//! line ─► iteration ─► bounds ─► ns_residual ─► ade_residual ─► phase
//!             │           │            │               │            │
//!          Progress   (state only) Convergence    Convergence   PhaseChanged
//! ```
//!
//! ## Example
//! ```rust
//! use simvisor::parse::{LineSignal, OutputParser};
//! use simvisor::Solver;
//!
//! let mut parser = OutputParser::new();
//! assert_eq!(
//!     parser.parse_line("iT = 4200"),
//!     vec![LineSignal::Progress { iteration: 4200, max_iteration: 0 }],
//! );
//! assert_eq!(
//!     parser.parse_line("NS residual = 1.2e-7"),
//!     vec![LineSignal::Convergence { solver: Solver::Ns, iteration: 4200, residual: 1.2e-7 }],
//! );
//! ```

use regex::Regex;

use super::patterns;
use super::state::ParseState;
use crate::events::Solver;

/// Structured fact extracted from one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSignal {
    /// Iteration progress after applying the monotonicity guard.
    Progress { iteration: u64, max_iteration: u64 },
    /// Residual sample for one solver.
    Convergence {
        solver: Solver,
        iteration: u64,
        residual: f64,
    },
    /// Phase header label.
    Phase { label: String },
}

/// Rule handler: inspects `line`, may update `state`, may push signals.
pub type RuleFn = fn(line: &str, state: &mut ParseState, out: &mut Vec<LineSignal>);

/// Named entry of the rule chain.
#[derive(Clone, Copy)]
pub struct Rule {
    /// Stable name, used in logs.
    pub name: &'static str,
    /// Handler.
    pub apply: RuleFn,
}

impl Rule {
    pub const fn new(name: &'static str, apply: RuleFn) -> Self {
        Self { name, apply }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Built-in chain, in evaluation order.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("iteration", iteration_rule),
        Rule::new("bounds", bounds_rule),
        Rule::new("ns_residual", ns_residual_rule),
        Rule::new("ade_residual", ade_residual_rule),
        Rule::new("phase", phase_rule),
    ]
}

/// Stateful line parser for one run.
#[derive(Debug)]
pub struct OutputParser {
    rules: Vec<Rule>,
    state: ParseState,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser {
    /// Parser with the built-in rule chain.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Parser with a custom rule chain.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            state: ParseState::default(),
        }
    }

    /// Appends a rule at the end of the chain.
    pub fn push_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Current parse state.
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Runs the chain over one line and returns the derived signals in rule order.
    pub fn parse_line(&mut self, line: &str) -> Vec<LineSignal> {
        let mut out = Vec::new();
        for rule in &self.rules {
            (rule.apply)(line, &mut self.state, &mut out);
        }
        out
    }
}

fn capture_u64(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

fn iteration_rule(line: &str, state: &mut ParseState, out: &mut Vec<LineSignal>) {
    let (iteration, bound) = if let Some(it) = capture_u64(&patterns::ITERATION_IT, line) {
        (it, None)
    } else if let Some(caps) = patterns::ITERATION_WORD.captures(line) {
        let Some(it) = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()) else {
            return;
        };
        (it, caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok()))
    } else {
        return;
    };

    let accepted = state.observe_iteration(iteration);
    let raised = bound.is_some_and(|b| state.raise_max(b));
    if accepted || raised {
        out.push(LineSignal::Progress {
            iteration: state.current_iteration,
            max_iteration: state.max_iteration,
        });
    }
}

fn bounds_rule(line: &str, state: &mut ParseState, _out: &mut Vec<LineSignal>) {
    if let Some(bound) = capture_u64(&patterns::ADE_MAX, line) {
        state.raise_max(bound);
    }
    if let Some(bound) = capture_u64(&patterns::NS_MAX, line) {
        state.raise_max(bound);
    }
}

fn residual(re: &Regex, solver: Solver, line: &str, state: &ParseState, out: &mut Vec<LineSignal>) {
    let Some(raw) = re.captures(line).and_then(|c| c.get(1)) else {
        return;
    };
    // Malformed literals ("3e", "1.e+") are dropped; the raw line is still forwarded.
    if let Ok(residual) = raw.as_str().parse::<f64>() {
        out.push(LineSignal::Convergence {
            solver,
            iteration: state.current_iteration,
            residual,
        });
    }
}

fn ns_residual_rule(line: &str, state: &mut ParseState, out: &mut Vec<LineSignal>) {
    residual(&patterns::NS_RESIDUAL, Solver::Ns, line, state, out);
}

fn ade_residual_rule(line: &str, state: &mut ParseState, out: &mut Vec<LineSignal>) {
    residual(&patterns::ADE_RESIDUAL, Solver::Ade, line, state, out);
}

fn phase_rule(line: &str, state: &mut ParseState, out: &mut Vec<LineSignal>) {
    if !patterns::PHASE_HEADER.is_match(line) {
        return;
    }
    let label = line
        .trim_matches(|c: char| c == '-' || c == '=' || c.is_whitespace())
        .to_string();
    state.current_phase = Some(label.clone());
    out.push(LineSignal::Phase { label });
}
