//! Retry decision for the review-retry loop.
//!
//! ```text
//! ReviewOutcome ──┐
//! retry_count  ───┼──decide──> RetryDecision { Accept | Continue | Abort }
//! max_retries  ───┘
//! ```
//!
//! `decide` is a pure function. Since `retry_count` grows by one on every
//! `Continue` and `Abort` is forced once it reaches `max_retries`, a run
//! performs at most `max_retries + 1` generate/review cycles.

use super::state::ReviewOutcome;
use serde::{Deserialize, Serialize};

/// Default retry budget when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted by configuration validation.
pub const MAX_RETRY_BUDGET: u32 = 20;

/// What the driver does after a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    /// Regenerate with the reviewer's feedback
    Continue,
    /// Save the artifact
    Accept,
    /// Give up; the retry budget is spent
    Abort,
}

impl std::fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "CONTINUE"),
            Self::Accept => write!(f, "ACCEPT"),
            Self::Abort => write!(f, "ABORT"),
        }
    }
}

/// Map a review outcome and the retry count to the next action.
///
/// # Example
///
/// ```
/// use csm_flow::flow::decision::{decide, RetryDecision};
/// use csm_flow::flow::state::ReviewOutcome;
///
/// let rejected = ReviewOutcome::rejected("missing emails");
/// assert_eq!(decide(&rejected, 0, 2), RetryDecision::Continue);
/// assert_eq!(decide(&rejected, 2, 2), RetryDecision::Abort);
/// assert_eq!(decide(&ReviewOutcome::accepted(), 2, 2), RetryDecision::Accept);
/// ```
#[must_use]
pub fn decide(outcome: &ReviewOutcome, retry_count: u32, max_retries: u32) -> RetryDecision {
    if outcome.valid {
        RetryDecision::Accept
    } else if retry_count >= max_retries {
        RetryDecision::Abort
    } else {
        RetryDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_always_accepts() {
        let outcome = ReviewOutcome::accepted();
        for retry_count in 0..5 {
            for max_retries in 0..5 {
                assert_eq!(
                    decide(&outcome, retry_count, max_retries),
                    RetryDecision::Accept
                );
            }
        }
    }

    #[test]
    fn test_valid_with_feedback_still_accepts() {
        let outcome = ReviewOutcome {
            valid: true,
            feedback: Some("minor nit".into()),
        };
        assert_eq!(decide(&outcome, 3, 3), RetryDecision::Accept);
    }

    #[test]
    fn test_invalid_below_budget_continues() {
        let outcome = ReviewOutcome::rejected("wrong titles");
        assert_eq!(decide(&outcome, 0, 3), RetryDecision::Continue);
        assert_eq!(decide(&outcome, 2, 3), RetryDecision::Continue);
    }

    #[test]
    fn test_invalid_at_budget_aborts() {
        let outcome = ReviewOutcome::rejected("wrong titles");
        assert_eq!(decide(&outcome, 3, 3), RetryDecision::Abort);
        assert_eq!(decide(&outcome, 4, 3), RetryDecision::Abort);
    }

    #[test]
    fn test_zero_budget_aborts_first_rejection() {
        let outcome = ReviewOutcome {
            valid: false,
            feedback: None,
        };
        assert_eq!(decide(&outcome, 0, 0), RetryDecision::Abort);
    }

    #[test]
    fn test_decide_is_repeatable() {
        let outcome = ReviewOutcome::rejected("x");
        let first = decide(&outcome, 1, 2);
        for _ in 0..10 {
            assert_eq!(decide(&outcome, 1, 2), first);
        }
    }

    #[test]
    fn test_loop_terminates_within_budget() {
        // Simulate an always-rejecting reviewer against the decision alone
        for max_retries in 0..8 {
            let outcome = ReviewOutcome::rejected("no");
            let mut retry_count = 0;
            let mut cycles = 0;
            loop {
                cycles += 1;
                match decide(&outcome, retry_count, max_retries) {
                    RetryDecision::Continue => retry_count += 1,
                    RetryDecision::Abort => break,
                    RetryDecision::Accept => unreachable!(),
                }
            }
            assert_eq!(cycles, max_retries + 1);
            assert_eq!(retry_count, max_retries);
        }
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(RetryDecision::Continue.to_string(), "CONTINUE");
        assert_eq!(RetryDecision::Accept.to_string(), "ACCEPT");
        assert_eq!(RetryDecision::Abort.to_string(), "ABORT");
    }
}
