//! Review crew: judges a CSM list and answers with a JSON verdict.

use super::{AgentProfile, TaskTemplate, TemplateMarker};
use crate::flow::collaborators::{ReviewCollaborator, ReviewInputs};
use crate::llm::LlmClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const CSM_REVIEWER: AgentProfile = AgentProfile {
    role: "Client Service Manager List Reviewer for {client}",
    goal: "Decide whether a CSM list for {client} is complete, sourced, and usable",
    backstory: "You audit account-team research before it reaches sales. You reject \
                lists with unsourced names, duplicates, missing contact channels, or \
                people who do not work on the account, and you explain exactly what \
                to fix.",
};

const CSM_REVIEW_TASK: TaskTemplate = TaskTemplate {
    description: "Review the following CSM list for {client}.\n\n\
                  ---\n{artifact}\n---\n\n\
                  Accept it only if every entry is plausible, sourced, and not \
                  duplicated. Otherwise reject it with concrete, actionable feedback.",
    expected_output: "Only a JSON object, with no other text:\n\
                      {\"valid\": true, \"feedback\": null}\n\
                      or\n\
                      {\"valid\": false, \"feedback\": \"what must change\"}",
};

/// Review collaborator backed by an LLM.
///
/// Returns the model's raw answer; parsing happens in
/// [`ReviewStep`](crate::flow::ReviewStep).
pub struct ReviewCrew {
    llm: Arc<dyn LlmClient>,
}

impl ReviewCrew {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Render the system and user prompts for `inputs`.
    #[must_use]
    pub fn prompts(inputs: &ReviewInputs) -> (String, String) {
        let system = CSM_REVIEWER.system_prompt(&inputs.client);
        let task = CSM_REVIEW_TASK.render(&[
            (TemplateMarker::Client, inputs.client.as_str()),
            (TemplateMarker::Artifact, inputs.artifact.as_str()),
        ]);
        (system, task)
    }
}

impl std::fmt::Debug for ReviewCrew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewCrew")
            .field("model", &self.llm.model_name())
            .finish()
    }
}

#[async_trait]
impl ReviewCollaborator for ReviewCrew {
    async fn invoke(&self, inputs: &ReviewInputs) -> Result<String> {
        let (system, task) = Self::prompts(inputs);
        debug!(
            "Review crew prompting {} ({} chars artifact)",
            self.llm.model_name(),
            inputs.artifact.len()
        );

        self.llm
            .run_with_system(&system, &task)
            .await
            .with_context(|| format!("review crew ({})", self.llm.model_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::state::ReviewOutcome;
    use crate::llm::MockLlmClient;

    fn inputs(artifact: &str) -> ReviewInputs {
        ReviewInputs {
            client: "Alpha LongTail LLC".into(),
            artifact: artifact.into(),
        }
    }

    #[test]
    fn test_prompt_embeds_artifact_and_schema() {
        let (system, task) = ReviewCrew::prompts(&inputs("- Jane Doe, CSM"));
        assert!(system.contains("Reviewer for Alpha LongTail LLC"));
        assert!(task.contains("---\n- Jane Doe, CSM\n---"));
        assert!(task.contains(r#"{"valid": false, "feedback": "what must change"}"#));
    }

    #[tokio::test]
    async fn test_invoke_returns_raw_output() {
        let raw = "```json\n{\"valid\": false, \"feedback\": \"no sources\"}\n```";
        let crew = ReviewCrew::new(Arc::new(MockLlmClient::new().with_response(raw)));

        let out = crew.invoke(&inputs("- Jane")).await.unwrap();
        assert_eq!(out, raw);
        assert_eq!(
            ReviewOutcome::parse(&out).unwrap(),
            ReviewOutcome::rejected("no sources")
        );
    }

    #[tokio::test]
    async fn test_invoke_propagates_llm_error() {
        let crew = ReviewCrew::new(Arc::new(MockLlmClient::new().with_error("timeout")));
        assert!(crew.invoke(&inputs("- Jane")).await.is_err());
    }
}
