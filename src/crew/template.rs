//! Prompt templates with `{client}`, `{feedback}`, and `{artifact}` markers.
//!
//! # Example
//!
//! ```
//! use csm_flow::crew::template::{Template, TemplateMarker};
//!
//! let template = Template::new("List the CSMs for {client}.");
//! let result = template.substitute(TemplateMarker::Client, "Acme");
//! assert_eq!(result.content(), "List the CSMs for Acme.");
//! ```

use std::collections::HashMap;

/// Variable markers that can be substituted in crew prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateMarker {
    /// Client the list is for.
    Client,
    /// Reviewer feedback from the previous cycle.
    Feedback,
    /// Artifact under review.
    Artifact,
}

impl TemplateMarker {
    /// Get the tag string for this marker.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            TemplateMarker::Client => "{client}",
            TemplateMarker::Feedback => "{feedback}",
            TemplateMarker::Artifact => "{artifact}",
        }
    }

    /// Get all markers.
    #[must_use]
    pub fn all() -> &'static [TemplateMarker] {
        &[
            TemplateMarker::Client,
            TemplateMarker::Feedback,
            TemplateMarker::Artifact,
        ]
    }
}

impl std::fmt::Display for TemplateMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A prompt template and the markers it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    content: String,
    markers: Vec<TemplateMarker>,
}

impl Template {
    /// Create a template, detecting its markers.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let markers = TemplateMarker::all()
            .iter()
            .copied()
            .filter(|m| content.contains(m.tag()))
            .collect();
        Self { content, markers }
    }

    /// Get the raw content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Get the markers found in this template.
    #[must_use]
    pub fn markers(&self) -> &[TemplateMarker] {
        &self.markers
    }

    /// Check if this template has a specific marker.
    #[must_use]
    pub fn has_marker(&self, marker: TemplateMarker) -> bool {
        self.markers.contains(&marker)
    }

    /// Substitute one marker.
    #[must_use]
    pub fn substitute(&self, marker: TemplateMarker, replacement: &str) -> Template {
        Template::new(self.content.replace(marker.tag(), replacement))
    }

    /// Substitute several markers in a single pass.
    ///
    /// Replacement text is never rescanned, so an artifact that happens to
    /// contain `{client}` is left as written.
    #[must_use]
    pub fn substitute_all(&self, substitutions: &HashMap<TemplateMarker, &str>) -> Template {
        let mut out = String::with_capacity(self.content.len());
        let mut rest = self.content.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let hit = substitutions
                .iter()
                .find(|(marker, _)| tail.starts_with(marker.tag()));

            match hit {
                Some((marker, replacement)) => {
                    out.push_str(replacement);
                    rest = &tail[marker.tag().len()..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);

        Template::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_markers() {
        let template = Template::new("{client} / {feedback}");
        assert!(template.has_marker(TemplateMarker::Client));
        assert!(template.has_marker(TemplateMarker::Feedback));
        assert!(!template.has_marker(TemplateMarker::Artifact));
    }

    #[test]
    fn test_substitute_all() {
        let template = Template::new("Review {artifact} for {client}.");
        let mut subs = HashMap::new();
        subs.insert(TemplateMarker::Client, "Acme");
        subs.insert(TemplateMarker::Artifact, "the list");

        let result = template.substitute_all(&subs);
        assert_eq!(result.content(), "Review the list for Acme.");
        assert!(result.markers().is_empty());
    }

    #[test]
    fn test_substitute_all_does_not_rescan_replacements() {
        let template = Template::new("{artifact} for {client}");
        let mut subs = HashMap::new();
        subs.insert(TemplateMarker::Client, "Acme");
        subs.insert(TemplateMarker::Artifact, "literal {client} and {braces}");

        let result = template.substitute_all(&subs);
        assert_eq!(result.content(), "literal {client} and {braces} for Acme");
    }

    #[test]
    fn test_unknown_braces_kept() {
        let template = Template::new(r#"Return {"valid": true} for {client}"#);
        let mut subs = HashMap::new();
        subs.insert(TemplateMarker::Client, "Acme");
        assert_eq!(
            template.substitute_all(&subs).content(),
            r#"Return {"valid": true} for Acme"#
        );
    }
}
