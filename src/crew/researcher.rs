//! Researcher crew: drafts the CSM list for a client.

use super::{AgentProfile, TaskTemplate, TemplateMarker, NO_PRIOR_FEEDBACK};
use crate::flow::collaborators::{GenerationCollaborator, GenerationInputs};
use crate::llm::LlmClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const CSM_RESEARCHER: AgentProfile = AgentProfile {
    role: "Client Service Manager Researcher for {client}",
    goal: "Identify the people who manage the relationship with {client} and how to reach them",
    backstory: "You have years of experience mapping account teams from public \
                sources, company sites, and press releases. You only report people \
                you have evidence for, and you say where the evidence came from.",
};

const COLLECT_CSM_DOCUMENTS: TaskTemplate = TaskTemplate {
    description: "Compile the list of client service managers (CSMs) for {client}.\n\
                  For each person give the name, title, team or region, contact \
                  channel if public, and the source of the information.\n\n\
                  Reviewer feedback on the previous draft:\n{feedback}\n\n\
                  Address every point of the feedback in this draft.",
    expected_output: "A markdown document titled with the client name, containing \
                      one bullet per CSM with the fields above. Do not wrap it in \
                      code fences.",
};

/// Generation collaborator backed by an LLM.
///
/// # Example
///
/// ```rust,ignore
/// let crew = ResearcherCrew::new(create_llm_client(&config.llm, &project_dir)?);
/// let step = GenerationStep::new(Arc::new(crew));
/// ```
pub struct ResearcherCrew {
    llm: Arc<dyn LlmClient>,
}

impl ResearcherCrew {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Render the system and user prompts for `inputs`.
    #[must_use]
    pub fn prompts(inputs: &GenerationInputs) -> (String, String) {
        let feedback = inputs
            .feedback
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(NO_PRIOR_FEEDBACK);

        let system = CSM_RESEARCHER.system_prompt(&inputs.client);
        let task = COLLECT_CSM_DOCUMENTS.render(&[
            (TemplateMarker::Client, inputs.client.as_str()),
            (TemplateMarker::Feedback, feedback),
        ]);
        (system, task)
    }
}

impl std::fmt::Debug for ResearcherCrew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearcherCrew")
            .field("model", &self.llm.model_name())
            .finish()
    }
}

#[async_trait]
impl GenerationCollaborator for ResearcherCrew {
    async fn invoke(&self, inputs: &GenerationInputs) -> Result<String> {
        let (system, task) = Self::prompts(inputs);
        debug!(
            "Researcher crew prompting {} for {}",
            self.llm.model_name(),
            inputs.client
        );

        let response = self
            .llm
            .run_with_system(&system, &task)
            .await
            .with_context(|| format!("researcher crew ({})", self.llm.model_name()))?;

        Ok(response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn inputs(feedback: Option<&str>) -> GenerationInputs {
        GenerationInputs {
            client: "Alpha LongTail LLC".into(),
            feedback: feedback.map(str::to_string),
        }
    }

    #[test]
    fn test_first_draft_prompt() {
        let (system, task) = ResearcherCrew::prompts(&inputs(None));
        assert!(system.contains("Alpha LongTail LLC"));
        assert!(task.contains("CSMs) for Alpha LongTail LLC"));
        assert!(task.contains(NO_PRIOR_FEEDBACK));
        assert!(!task.contains("{feedback}"));
    }

    #[test]
    fn test_feedback_is_rendered() {
        let (_, task) = ResearcherCrew::prompts(&inputs(Some("add the EMEA team")));
        assert!(task.contains("add the EMEA team"));
        assert!(!task.contains(NO_PRIOR_FEEDBACK));
    }

    #[tokio::test]
    async fn test_invoke_trims_response() {
        let llm = Arc::new(MockLlmClient::new().with_response("\n# CSMs\n- Jane\n\n"));
        let crew = ResearcherCrew::new(llm.clone());

        let artifact = crew.invoke(&inputs(None)).await.unwrap();
        assert_eq!(artifact, "# CSMs\n- Jane");
        assert_eq!(llm.call_count(), 1);
        assert!(llm.prompts()[0].contains("Client Service Manager Researcher"));
    }

    #[tokio::test]
    async fn test_invoke_propagates_llm_error() {
        let crew = ResearcherCrew::new(Arc::new(MockLlmClient::new().with_error("quota")));
        let err = crew.invoke(&inputs(None)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("quota"));
    }
}
