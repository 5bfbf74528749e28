//! Mock implementations of the workflow collaborators.
//!
//! These mocks provide scripted, recording test doubles so workflow runs
//! are deterministic in unit and integration tests.

use crate::flow::collaborators::{
    AbortNotifier, ArtifactSink, GenerationCollaborator, GenerationInputs, ReviewCollaborator,
    ReviewInputs,
};
use crate::flow::state::ReviewOutcome;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// One scripted response: `Ok` is returned as-is, `Err` becomes a failure.
type Scripted = std::result::Result<String, String>;

/// Pick the scripted response for call `index`, repeating the last one.
fn scripted(script: &[Scripted], index: u32) -> Option<&Scripted> {
    let last = script.len().checked_sub(1)?;
    script.get((index as usize).min(last))
}

/// Scripted generation collaborator.
///
/// Responses are consumed in order and the last one repeats. With an empty
/// script every call returns a distinct draft naming the client.
///
/// # Example
///
/// ```rust,ignore
/// let generator = ScriptedGenerator::new()
///     .with_error("search quota exhausted")
///     .with_artifact("list v2");
///
/// assert!(generator.invoke(&inputs).await.is_err());
/// assert_eq!(generator.invoke(&inputs).await.unwrap(), "list v2");
/// ```
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Vec<Scripted>,
    calls: Mutex<Vec<GenerationInputs>>,
    call_count: AtomicU32,
}

impl ScriptedGenerator {
    /// Create a generator with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact to the script.
    #[must_use]
    pub fn with_artifact(mut self, artifact: &str) -> Self {
        self.script.push(Ok(artifact.to_string()));
        self
    }

    /// Append a failure to the script.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.script.push(Err(error.to_string()));
        self
    }

    /// Get the number of times `invoke` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get the inputs of every call so far.
    pub fn calls(&self) -> Vec<GenerationInputs> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationCollaborator for ScriptedGenerator {
    async fn invoke(&self, inputs: &GenerationInputs) -> Result<String> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(inputs.clone());
        }

        match scripted(&self.script, index) {
            Some(Ok(artifact)) => Ok(artifact.clone()),
            Some(Err(error)) => bail!("{}", error),
            None => Ok(format!("CSM list for {} (draft {})", inputs.client, index + 1)),
        }
    }
}

/// Scripted review collaborator.
///
/// Responses are consumed in order and the last one repeats. With an empty
/// script every review accepts.
///
/// # Example
///
/// ```rust,ignore
/// let reviewer = ScriptedReviewer::new()
///     .with_outcome(ReviewOutcome::rejected("missing emails"))
///     .with_outcome(ReviewOutcome::accepted());
/// ```
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    script: Vec<Scripted>,
    calls: Mutex<Vec<ReviewInputs>>,
    call_count: AtomicU32,
}

impl ScriptedReviewer {
    /// Create a reviewer with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a well-formed outcome to the script.
    #[must_use]
    pub fn with_outcome(mut self, outcome: ReviewOutcome) -> Self {
        let raw = serde_json::to_string(&outcome).unwrap_or_default();
        self.script.push(Ok(raw));
        self
    }

    /// Append raw reviewer output to the script.
    #[must_use]
    pub fn with_raw(mut self, raw: &str) -> Self {
        self.script.push(Ok(raw.to_string()));
        self
    }

    /// Append a transport failure to the script.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.script.push(Err(error.to_string()));
        self
    }

    /// Get the number of times `invoke` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get the inputs of every call so far.
    pub fn calls(&self) -> Vec<ReviewInputs> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReviewCollaborator for ScriptedReviewer {
    async fn invoke(&self, inputs: &ReviewInputs) -> Result<String> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(inputs.clone());
        }

        match scripted(&self.script, index) {
            Some(Ok(raw)) => Ok(raw.clone()),
            Some(Err(error)) => bail!("{}", error),
            None => Ok(r#"{"valid": true, "feedback": null}"#.to_string()),
        }
    }
}

/// Sink that records saved artifacts in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    saved: Mutex<Vec<String>>,
    error: Option<String>,
}

impl RecordingSink {
    /// Create a sink that accepts every save.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure every save to fail.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Get every artifact saved so far.
    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactSink for RecordingSink {
    async fn save(&self, artifact: &str) -> Result<()> {
        if let Some(ref error) = self.error {
            bail!("{}", error)
        }
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(artifact.to_string());
        }
        Ok(())
    }
}

/// Notifier that records abort reasons in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reasons: Mutex<Vec<String>>,
    error: Option<String>,
}

impl RecordingNotifier {
    /// Create a notifier that accepts every notification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure every notification to fail.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Get every abort reason received so far.
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AbortNotifier for RecordingNotifier {
    async fn notify(&self, reason: &str) -> Result<()> {
        if let Some(ref error) = self.error {
            bail!("{}", error)
        }
        if let Ok(mut reasons) = self.reasons.lock() {
            reasons.push(reason.to_string());
        }
        Ok(())
    }
}
