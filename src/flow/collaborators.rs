//! Collaborator interfaces consumed by the workflow.
//!
//! Each external capability is a single-method trait injected into the
//! steps and the driver at construction time. Implementations live in
//! [`crate::crew`] (LLM-backed), [`crate::sink`] (save/abort), and
//! [`crate::testing`] (scripted test doubles).
//!
//! All traits are object-safe and `Send + Sync` so they can be shared as
//! `Arc<dyn Trait>` across async tasks.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inputs to a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInputs {
    /// Client the list is generated for
    pub client: String,
    /// Reviewer feedback from the previous cycle, if any
    pub feedback: Option<String>,
}

/// Inputs to a review call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInputs {
    /// Client the list was generated for
    pub client: String,
    /// Artifact under review
    pub artifact: String,
}

/// Produces an artifact for a client.
#[async_trait]
pub trait GenerationCollaborator: Send + Sync {
    /// Generate an artifact.
    ///
    /// # Errors
    ///
    /// Any error is surfaced by the generation step as `GenerationFailed`.
    async fn invoke(&self, inputs: &GenerationInputs) -> Result<String>;
}

/// Judges an artifact and returns the raw structured verdict.
///
/// The returned text must contain a JSON object with a boolean `valid`
/// and optional string `feedback`; parsing is the review step's job.
#[async_trait]
pub trait ReviewCollaborator: Send + Sync {
    /// Review an artifact.
    ///
    /// # Errors
    ///
    /// Any error is surfaced by the review step as `ReviewFailed`.
    async fn invoke(&self, inputs: &ReviewInputs) -> Result<String>;
}

/// Persists an accepted artifact.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Save the accepted artifact.
    async fn save(&self, artifact: &str) -> Result<()>;
}

/// Receives the reason a run was aborted.
#[async_trait]
pub trait AbortNotifier: Send + Sync {
    /// Report an abort.
    async fn notify(&self, reason: &str) -> Result<()>;
}
