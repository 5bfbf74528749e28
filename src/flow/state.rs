//! Workflow state types and transitions.
//!
//! This module defines the state threaded through the review-retry loop,
//! the structured review outcome, and the phases the driver moves through.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};

/// Phase of the review-retry workflow.
///
/// # Example
///
/// ```
/// use csm_flow::flow::state::FlowPhase;
///
/// assert_eq!(FlowPhase::Generating.to_string(), "generating");
/// assert!(FlowPhase::Accepted.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    /// Waiting on the generation step
    Generating,
    /// Waiting on the review step
    Reviewing,
    /// Review accepted the artifact (terminal)
    Accepted,
    /// Retry budget exhausted (terminal)
    Aborted,
}

impl FlowPhase {
    /// All phases in declaration order.
    pub const ALL: [FlowPhase; 4] = [
        FlowPhase::Generating,
        FlowPhase::Reviewing,
        FlowPhase::Accepted,
        FlowPhase::Aborted,
    ];

    /// Check whether the workflow ends in this phase.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Aborted)
    }
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Accepted => write!(f, "accepted"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Structured result of a review.
///
/// `valid` is required; a result without it is malformed. Feedback is
/// expected on rejection but not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    /// Whether the reviewed artifact is acceptable
    pub valid: bool,
    /// Reviewer feedback for the next generation
    #[serde(default)]
    pub feedback: Option<String>,
}

impl ReviewOutcome {
    /// An accepting outcome without feedback.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            valid: true,
            feedback: None,
        }
    }

    /// A rejecting outcome carrying feedback.
    #[must_use]
    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self {
            valid: false,
            feedback: Some(feedback.into()),
        }
    }

    /// Parse a review outcome from raw structured output.
    ///
    /// Accepts a bare JSON object, a fenced ```json block, or an object
    /// embedded in surrounding prose. The first object that carries a
    /// verdict wins. Blank feedback is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ReviewMalformed`] when no JSON object can be
    /// found, or when `valid` is missing or not a boolean.
    ///
    /// # Example
    ///
    /// ```
    /// use csm_flow::flow::state::ReviewOutcome;
    ///
    /// let outcome = ReviewOutcome::parse(r#"{"valid": false, "feedback": "add emails"}"#).unwrap();
    /// assert!(!outcome.valid);
    /// assert_eq!(outcome.feedback.as_deref(), Some("add emails"));
    ///
    /// assert!(ReviewOutcome::parse(r#"{"feedback": "no verdict"}"#).is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let mut first_error = None;

        for candidate in json_objects(raw) {
            match serde_json::from_value::<ReviewOutcome>(candidate) {
                Ok(mut outcome) => {
                    if outcome
                        .feedback
                        .as_deref()
                        .is_some_and(|f| f.trim().is_empty())
                    {
                        outcome.feedback = None;
                    }
                    return Ok(outcome);
                }
                Err(e) => {
                    first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        Err(FlowError::review_malformed(
            first_error.unwrap_or_else(|| "no JSON object found in review output".to_string()),
            raw,
        ))
    }
}

/// Every complete JSON object in model output, in order of appearance.
///
/// Each `{` is tried as the start of a value and only the first complete
/// value after it is parsed, so braces in prose and trailing text (including
/// closing code fences) are ignored.
fn json_objects(content: &str) -> impl Iterator<Item = serde_json::Value> + '_ {
    content.match_indices('{').filter_map(move |(start, _)| {
        serde_json::Deserializer::from_str(&content[start..])
            .into_iter::<serde_json::Value>()
            .next()?
            .ok()
            .filter(serde_json::Value::is_object)
    })
}

/// State of a single workflow run.
///
/// Created once per run and mutated only by the driver between steps.
///
/// # Example
///
/// ```
/// use csm_flow::flow::state::WorkflowState;
///
/// let state = WorkflowState::new("Alpha LongTail LLC");
/// assert_eq!(state.iteration, 0);
/// assert_eq!(state.retry_count, 0);
/// assert!(state.feedback.is_none());
/// assert!(!state.accepted);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Client the list is generated for
    pub client: String,
    /// Number of generate/review cycles started
    pub iteration: u32,
    /// Most recent generated artifact
    pub artifact: String,
    /// Most recent reviewer feedback
    pub feedback: Option<String>,
    /// Number of rejected cycles that led to regeneration
    pub retry_count: u32,
    /// Set once a review accepts the artifact
    pub accepted: bool,
    /// Most recent review outcome
    pub last_outcome: Option<ReviewOutcome>,
}

impl WorkflowState {
    /// Create the initial state for a run.
    #[must_use]
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            iteration: 0,
            artifact: String::new(),
            feedback: None,
            retry_count: 0,
            accepted: false,
            last_outcome: None,
        }
    }

    /// Record a freshly generated artifact, starting a new cycle.
    pub fn record_artifact(&mut self, artifact: String) {
        self.iteration += 1;
        self.artifact = artifact;
    }

    /// Record an accepting review.
    pub fn record_acceptance(&mut self, outcome: ReviewOutcome) {
        self.accepted = outcome.valid;
        self.last_outcome = Some(outcome);
    }

    /// Record a rejection that leads to another generation.
    pub fn record_retry(&mut self, outcome: ReviewOutcome) {
        self.feedback = outcome.feedback.clone();
        self.retry_count += 1;
        self.last_outcome = Some(outcome);
    }

    /// Record the final rejection once the retry budget is spent.
    pub fn record_final_rejection(&mut self, outcome: ReviewOutcome) {
        self.feedback = outcome.feedback.clone();
        self.last_outcome = Some(outcome);
    }
}
