//! csm-flow - review-retry workflow for client service manager lists
//!
//! A researcher crew drafts the list of client service managers (CSMs) for
//! a client, a review crew accepts or rejects it with feedback, and the
//! draft is regenerated with that feedback until it is accepted or the
//! retry budget runs out.
//!
//! # Architecture
//!
//! - [`flow`] - Workflow state, retry decision, steps, and the driver
//! - [`crew`] - LLM-backed generation and review collaborators
//! - [`llm`] - LLM client abstraction (OpenAI, Claude CLI, mock)
//! - [`sink`] - File sink and console abort notifier
//! - [`config`] - Layered settings loading and validation
//! - [`analytics`] - JSONL run log
//! - [`error`] - Error taxonomy and exit codes
//! - [`testing`] - Scripted collaborators for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use csm_flow::flow::{GenerationStep, ReviewStep, WorkflowDriver};
//! use csm_flow::testing::{RecordingNotifier, RecordingSink, ScriptedGenerator, ScriptedReviewer};
//!
//! let driver = WorkflowDriver::new(
//!     GenerationStep::new(Arc::new(ScriptedGenerator::new())),
//!     ReviewStep::new(Arc::new(ScriptedReviewer::new())),
//!     Arc::new(RecordingSink::new()),
//!     Arc::new(RecordingNotifier::new()),
//! )
//! .with_max_retries(2);
//!
//! let outcome = driver.run("Alpha LongTail LLC").await?;
//! ```

pub mod analytics;
pub mod config;
pub mod crew;
pub mod error;
pub mod flow;
pub mod llm;
pub mod sink;
pub mod testing;

// Re-export commonly used types
pub use error::{ExitReport, FlowError, IntoFlowError, Result};

pub use analytics::{RunEvent, RunLog, RunSummary};
pub use config::FlowConfig;
pub use crew::{ResearcherCrew, ReviewCrew};
pub use flow::{
    decide, FlowOutcome, FlowPhase, GenerationStep, RetryDecision, ReviewOutcome, ReviewStep,
    WorkflowDriver, WorkflowState,
};
pub use llm::{create_llm_client, LlmClient, LlmConfig};
pub use sink::{ConsoleNotifier, FileSink};
