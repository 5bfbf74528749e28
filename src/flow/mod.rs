//! The review-retry workflow.
//!
//! A run alternates between a generation step and a review step until the
//! reviewer accepts the artifact or the retry budget is spent:
//!
//! - [`state`]: phases, the review outcome, and the per-run state
//! - [`decision`]: the pure accept/continue/abort rule
//! - [`collaborators`]: traits for the injected capabilities
//! - [`steps`]: input checks and error mapping around each collaborator
//! - [`driver`]: the phase loop
//! - [`plot`]: phase graph rendering

pub mod collaborators;
pub mod decision;
pub mod driver;
pub mod plot;
pub mod state;
pub mod steps;

pub use collaborators::{
    AbortNotifier, ArtifactSink, GenerationCollaborator, GenerationInputs, ReviewCollaborator,
    ReviewInputs,
};
pub use decision::{decide, RetryDecision, DEFAULT_MAX_RETRIES, MAX_RETRY_BUDGET};
pub use driver::{FlowOutcome, WorkflowDriver};
pub use plot::{render, PlotFormat};
pub use state::{FlowPhase, ReviewOutcome, WorkflowState};
pub use steps::{GenerationStep, ReviewStep};
