//! Parse state carried across lines of one run.

use std::time::Duration;

/// Iteration and phase state extracted from the solver's output so far.
///
/// ## Rules
/// - `current_iteration` never decreases: smaller values are noise
///   (the solver prints plenty of unrelated numbers).
/// - `max_iteration` never decreases: bounds from different solvers are
///   combined with `max`, not "latest wins".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseState {
    /// Last accepted NS or ADE iteration number.
    pub current_iteration: u64,
    /// Largest iteration bound seen (`0` = unknown).
    pub max_iteration: u64,
    /// Last phase header label.
    pub current_phase: Option<String>,
}

impl ParseState {
    /// Accepts `iteration` if it does not regress; returns whether it was accepted.
    pub fn observe_iteration(&mut self, iteration: u64) -> bool {
        if iteration >= self.current_iteration {
            self.current_iteration = iteration;
            true
        } else {
            false
        }
    }

    /// Raises the iteration bound; returns whether it changed.
    pub fn raise_max(&mut self, bound: u64) -> bool {
        if bound > self.max_iteration {
            self.max_iteration = bound;
            true
        } else {
            false
        }
    }

    /// Completed fraction in `[0, 1]`, when the bound is known.
    pub fn fraction(&self) -> Option<f64> {
        if self.max_iteration == 0 {
            return None;
        }
        Some((self.current_iteration as f64 / self.max_iteration as f64).min(1.0))
    }

    /// Remaining time, extrapolated linearly from `elapsed` and [`fraction`](Self::fraction).
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let f = self.fraction()?;
        if f <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(elapsed.as_secs_f64() / f * (1.0 - f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_does_not_regress() {
        let mut st = ParseState::default();
        assert!(st.observe_iteration(100));
        assert!(!st.observe_iteration(40));
        assert_eq!(st.current_iteration, 100);
        assert!(st.observe_iteration(100));
    }

    #[test]
    fn max_takes_largest() {
        let mut st = ParseState::default();
        assert!(st.raise_max(50_000));
        assert!(!st.raise_max(20_000));
        assert_eq!(st.max_iteration, 50_000);
    }

    #[test]
    fn fraction_is_capped() {
        let mut st = ParseState::default();
        assert_eq!(st.fraction(), None);
        st.raise_max(10);
        st.observe_iteration(25);
        assert_eq!(st.fraction(), Some(1.0));
    }

    #[test]
    fn eta_extrapolates_linearly() {
        let mut st = ParseState::default();
        assert_eq!(st.eta(Duration::from_secs(10)), None);
        st.raise_max(100);
        assert_eq!(st.eta(Duration::from_secs(10)), None);
        st.observe_iteration(25);
        assert_eq!(st.eta(Duration::from_secs(10)), Some(Duration::from_secs(30)));
        st.observe_iteration(100);
        assert_eq!(st.eta(Duration::from_secs(40)), Some(Duration::ZERO));
    }
}
