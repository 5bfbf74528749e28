//! LLM-backed collaborators.
//!
//! A crew is an agent profile (role, goal, backstory) plus one task
//! template, bound to an [`LlmClient`]. The agent profile becomes the
//! system message; the rendered task becomes the user message.
//!
//! - [`ResearcherCrew`] implements [`GenerationCollaborator`]
//! - [`ReviewCrew`] implements [`ReviewCollaborator`]
//!
//! [`LlmClient`]: crate::llm::LlmClient
//! [`GenerationCollaborator`]: crate::flow::GenerationCollaborator
//! [`ReviewCollaborator`]: crate::flow::ReviewCollaborator

pub mod researcher;
pub mod reviewer;
pub mod template;

pub use researcher::ResearcherCrew;
pub use reviewer::ReviewCrew;
pub use template::{Template, TemplateMarker};

use std::collections::HashMap;

/// Agent persona rendered into the system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl AgentProfile {
    /// Render the profile as a system message for `client`.
    #[must_use]
    pub fn system_prompt(&self, client: &str) -> String {
        let template = Template::new(format!(
            "You are the {}.\n\nGoal: {}\n\n{}",
            self.role, self.goal, self.backstory
        ));
        template
            .substitute(TemplateMarker::Client, client)
            .content()
            .to_string()
    }
}

/// A task description and the output it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTemplate {
    pub description: &'static str,
    pub expected_output: &'static str,
}

impl TaskTemplate {
    /// Render the task with the given marker values.
    #[must_use]
    pub fn render(&self, values: &[(TemplateMarker, &str)]) -> String {
        let template = Template::new(format!(
            "{}\n\nExpected output:\n{}",
            self.description, self.expected_output
        ));
        let subs: HashMap<TemplateMarker, &str> = values.iter().copied().collect();
        template.substitute_all(&subs).content().to_string()
    }
}

/// Text used for `{feedback}` on the first generation.
pub const NO_PRIOR_FEEDBACK: &str = "No prior feedback. This is the first draft.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_substitutes_client() {
        let profile = AgentProfile {
            role: "{client} analyst",
            goal: "Know {client}",
            backstory: "Seasoned.",
        };
        let prompt = profile.system_prompt("Acme");
        assert!(prompt.starts_with("You are the Acme analyst."));
        assert!(prompt.contains("Goal: Know Acme"));
    }

    #[test]
    fn test_task_render() {
        let task = TaskTemplate {
            description: "Research {client}. Feedback: {feedback}",
            expected_output: "A list.",
        };
        let rendered = task.render(&[
            (TemplateMarker::Client, "Acme"),
            (TemplateMarker::Feedback, NO_PRIOR_FEEDBACK),
        ]);
        assert!(rendered.contains("Research Acme."));
        assert!(rendered.contains(NO_PRIOR_FEEDBACK));
        assert!(rendered.ends_with("Expected output:\nA list."));
    }
}
