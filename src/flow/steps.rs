//! Generation and review step adapters.
//!
//! The steps check their input contract, call their collaborator exactly
//! once, and translate failures into the workflow's error taxonomy. They
//! never retry; that is the driver's decision.

use super::collaborators::{
    GenerationCollaborator, GenerationInputs, ReviewCollaborator, ReviewInputs,
};
use super::state::ReviewOutcome;
use crate::error::{FlowError, Result};
use std::sync::Arc;
use tracing::debug;

/// Invokes the generation collaborator.
#[derive(Clone)]
pub struct GenerationStep {
    collaborator: Arc<dyn GenerationCollaborator>,
}

impl GenerationStep {
    /// Create a generation step around a collaborator.
    #[must_use]
    pub fn new(collaborator: Arc<dyn GenerationCollaborator>) -> Self {
        Self { collaborator }
    }

    /// Generate an artifact for `client`, passing any prior feedback.
    ///
    /// # Errors
    ///
    /// - [`FlowError::InvalidInput`] if `client` is blank
    /// - [`FlowError::GenerationFailed`] if the collaborator errors or
    ///   returns an empty artifact
    pub async fn generate(&self, client: &str, feedback: Option<&str>) -> Result<String> {
        if client.trim().is_empty() {
            return Err(FlowError::invalid_input(
                "generate",
                "client identifier is empty",
            ));
        }

        let inputs = GenerationInputs {
            client: client.to_string(),
            feedback: feedback.map(str::to_string),
        };

        debug!(
            "Generating artifact for {} (feedback: {})",
            client,
            feedback.is_some()
        );

        let artifact = self
            .collaborator
            .invoke(&inputs)
            .await
            .map_err(|e| FlowError::generation(format!("{:#}", e)))?;

        if artifact.trim().is_empty() {
            return Err(FlowError::generation("collaborator returned an empty artifact"));
        }

        Ok(artifact)
    }
}

impl std::fmt::Debug for GenerationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStep").finish_non_exhaustive()
    }
}

/// Invokes the review collaborator and parses its verdict.
#[derive(Clone)]
pub struct ReviewStep {
    collaborator: Arc<dyn ReviewCollaborator>,
}

impl ReviewStep {
    /// Create a review step around a collaborator.
    #[must_use]
    pub fn new(collaborator: Arc<dyn ReviewCollaborator>) -> Self {
        Self { collaborator }
    }

    /// Review `artifact` for `client`.
    ///
    /// # Errors
    ///
    /// - [`FlowError::InvalidInput`] if `artifact` is blank
    /// - [`FlowError::ReviewFailed`] if the collaborator errors
    /// - [`FlowError::ReviewMalformed`] if the verdict cannot be parsed
    pub async fn review(&self, artifact: &str, client: &str) -> Result<ReviewOutcome> {
        if artifact.trim().is_empty() {
            return Err(FlowError::invalid_input("review", "artifact is empty"));
        }

        let inputs = ReviewInputs {
            client: client.to_string(),
            artifact: artifact.to_string(),
        };

        debug!("Reviewing artifact ({} chars) for {}", artifact.len(), client);

        let raw = self
            .collaborator
            .invoke(&inputs)
            .await
            .map_err(|e| FlowError::review_failed(format!("{:#}", e)))?;

        ReviewOutcome::parse(&raw)
    }
}

impl std::fmt::Debug for ReviewStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewStep").finish_non_exhaustive()
    }
}
