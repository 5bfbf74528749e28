//! Workflow driver: sequences generation, review, and the retry decision.
//!
//! ```text
//!                ┌──────────── CONTINUE (feedback, retry_count += 1) ─────┐
//!                v                                                        │
//!  start ──> GENERATING ──ok──> REVIEWING ──decide──┬── ACCEPT ──> ACCEPTED (save)
//!                                                   └── ABORT  ──> ABORTED  (notify)
//! ```
//!
//! Any step or collaborator failure ends the run immediately and is
//! returned to the caller; it is not a modelled phase.

use super::collaborators::{AbortNotifier, ArtifactSink};
use super::decision::{decide, RetryDecision, DEFAULT_MAX_RETRIES};
use super::state::{FlowPhase, ReviewOutcome, WorkflowState};
use super::steps::{GenerationStep, ReviewStep};
use crate::analytics::{artifact_digest, RunLog};
use crate::error::{FlowError, IntoFlowError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Terminal result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// The reviewer accepted the artifact and it was saved.
    Accepted {
        artifact: String,
        cycles: u32,
        retry_count: u32,
    },
    /// The retry budget ran out.
    Aborted {
        feedback: Option<String>,
        cycles: u32,
        retry_count: u32,
    },
}

impl FlowOutcome {
    /// The terminal phase this outcome corresponds to.
    #[must_use]
    pub fn phase(&self) -> FlowPhase {
        match self {
            Self::Accepted { .. } => FlowPhase::Accepted,
            Self::Aborted { .. } => FlowPhase::Aborted,
        }
    }

    /// Number of generate/review cycles performed.
    #[must_use]
    pub fn cycles(&self) -> u32 {
        match self {
            Self::Accepted { cycles, .. } | Self::Aborted { cycles, .. } => *cycles,
        }
    }

    /// Check whether the run was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Convert an abort into [`FlowError::MaxRetriesExceeded`].
    ///
    /// # Errors
    ///
    /// Returns `MaxRetriesExceeded` carrying the last feedback when the run
    /// was aborted.
    pub fn into_result(self, max_retries: u32) -> Result<String> {
        match self {
            Self::Accepted { artifact, .. } => Ok(artifact),
            Self::Aborted {
                feedback, cycles, ..
            } => Err(FlowError::MaxRetriesExceeded {
                max_retries,
                cycles,
                feedback,
            }),
        }
    }
}

/// Drives a single review-retry workflow run.
///
/// # Example
///
/// ```rust,ignore
/// let driver = WorkflowDriver::new(generation, review, sink, notifier)
///     .with_max_retries(2);
///
/// match driver.run("Alpha LongTail LLC").await? {
///     FlowOutcome::Accepted { artifact, .. } => println!("{}", artifact),
///     FlowOutcome::Aborted { feedback, .. } => eprintln!("gave up: {:?}", feedback),
/// }
/// ```
pub struct WorkflowDriver {
    generation: GenerationStep,
    review: ReviewStep,
    sink: Arc<dyn ArtifactSink>,
    notifier: Arc<dyn AbortNotifier>,
    max_retries: u32,
    run_log: Option<RunLog>,
}

impl WorkflowDriver {
    /// Create a driver with the default retry budget and no run log.
    #[must_use]
    pub fn new(
        generation: GenerationStep,
        review: ReviewStep,
        sink: Arc<dyn ArtifactSink>,
        notifier: Arc<dyn AbortNotifier>,
    ) -> Self {
        Self {
            generation,
            review,
            sink,
            notifier,
            max_retries: DEFAULT_MAX_RETRIES,
            run_log: None,
        }
    }

    /// Set the retry budget. It stays fixed for every run of this driver.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a run log.
    #[must_use]
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// The configured retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run the workflow for `client` until it is accepted, aborted, or fails.
    ///
    /// # Errors
    ///
    /// Propagates the first step failure (`GenerationFailed`,
    /// `ReviewMalformed`, `ReviewFailed`, `InvalidInput`) or a Save/Abort
    /// collaborator failure (`FatalCollaborator`). Exhausting the retry
    /// budget is *not* an error; it returns [`FlowOutcome::Aborted`].
    pub async fn run(&self, client: &str) -> Result<FlowOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting run {} for {} (max retries: {})",
            &run_id[..8],
            client,
            self.max_retries
        );
        self.log(
            &run_id,
            "run_start",
            serde_json::json!({ "client": client, "max_retries": self.max_retries }),
        );

        let result = self.drive(&run_id, client).await;

        match &result {
            Ok(FlowOutcome::Accepted { cycles, .. }) => {
                info!("Run accepted after {} cycle(s)", cycles);
            }
            Ok(FlowOutcome::Aborted { cycles, .. }) => {
                warn!("Run aborted after {} cycle(s)", cycles);
            }
            Err(e) => {
                warn!("Run failed: {}", e);
                self.log(
                    &run_id,
                    "failed",
                    serde_json::json!({ "error": e.to_string() }),
                );
            }
        }

        result
    }

    async fn drive(&self, run_id: &str, client: &str) -> Result<FlowOutcome> {
        let mut state = WorkflowState::new(client);
        let mut phase = FlowPhase::Generating;

        loop {
            debug!("Cycle {} phase: {}", state.iteration, phase);

            phase = match phase {
                FlowPhase::Generating => {
                    let artifact = self
                        .generation
                        .generate(&state.client, state.feedback.as_deref())
                        .await?;
                    state.record_artifact(artifact);
                    FlowPhase::Reviewing
                }
                FlowPhase::Reviewing => {
                    let outcome = self.review.review(&state.artifact, &state.client).await?;
                    let decision = decide(&outcome, state.retry_count, self.max_retries);
                    self.log_cycle(run_id, &state, &outcome, decision);
                    self.apply(&mut state, outcome, decision)
                }
                FlowPhase::Accepted => {
                    self.sink
                        .save(&state.artifact)
                        .await
                        .into_flow_collaborator("save")?;
                    self.log(
                        run_id,
                        "accepted",
                        serde_json::json!({
                            "cycles": state.iteration,
                            "retry_count": state.retry_count,
                            "artifact_sha256": artifact_digest(&state.artifact),
                        }),
                    );
                    return Ok(FlowOutcome::Accepted {
                        artifact: state.artifact,
                        cycles: state.iteration,
                        retry_count: state.retry_count,
                    });
                }
                FlowPhase::Aborted => {
                    let reason = abort_reason(&state, self.max_retries);
                    self.notifier
                        .notify(&reason)
                        .await
                        .into_flow_collaborator("abort")?;
                    self.log(
                        run_id,
                        "aborted",
                        serde_json::json!({
                            "cycles": state.iteration,
                            "retry_count": state.retry_count,
                            "feedback": state.feedback,
                        }),
                    );
                    return Ok(FlowOutcome::Aborted {
                        feedback: state.feedback,
                        cycles: state.iteration,
                        retry_count: state.retry_count,
                    });
                }
            };
        }
    }

    /// Apply a decision to the state and return the next phase.
    fn apply(
        &self,
        state: &mut WorkflowState,
        outcome: ReviewOutcome,
        decision: RetryDecision,
    ) -> FlowPhase {
        match decision {
            RetryDecision::Accept => {
                info!("Cycle {}: review accepted", state.iteration);
                state.record_acceptance(outcome);
                FlowPhase::Accepted
            }
            RetryDecision::Continue => {
                warn!(
                    "Cycle {}: review rejected, retrying ({}/{})",
                    state.iteration,
                    state.retry_count + 1,
                    self.max_retries
                );
                state.record_retry(outcome);
                FlowPhase::Generating
            }
            RetryDecision::Abort => {
                warn!(
                    "Cycle {}: review rejected, retry budget exhausted",
                    state.iteration
                );
                state.record_final_rejection(outcome);
                FlowPhase::Aborted
            }
        }
    }

    fn log_cycle(
        &self,
        run_id: &str,
        state: &WorkflowState,
        outcome: &ReviewOutcome,
        decision: RetryDecision,
    ) {
        self.log(
            run_id,
            "cycle",
            serde_json::json!({
                "cycle": state.iteration,
                "retry_count": state.retry_count,
                "valid": outcome.valid,
                "feedback": outcome.feedback,
                "decision": decision,
                "artifact_sha256": artifact_digest(&state.artifact),
                "artifact_len": state.artifact.len(),
            }),
        );
    }

    /// Run log failures never change the run outcome.
    fn log(&self, run_id: &str, event: &str, data: serde_json::Value) {
        if let Some(run_log) = &self.run_log {
            if let Err(e) = run_log.log_event(run_id, event, data) {
                warn!("Failed to write run log event '{}': {}", event, e);
            }
        }
    }
}

impl std::fmt::Debug for WorkflowDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDriver")
            .field("max_retries", &self.max_retries)
            .field("run_log", &self.run_log)
            .finish_non_exhaustive()
    }
}

fn abort_reason(state: &WorkflowState, max_retries: u32) -> String {
    match state.feedback.as_deref() {
        Some(feedback) => format!(
            "Max retries ({}) exceeded after {} cycles. Last feedback: {}",
            max_retries, state.iteration, feedback
        ),
        None => format!(
            "Max retries ({}) exceeded after {} cycles",
            max_retries, state.iteration
        ),
    }
}
