//! Configuration for csm-flow.
//!
//! Settings live in `.csm/settings.json` under the project directory and in
//! the user's config directory; see [`resolution`] for how they combine.
//!
//! ```json
//! {
//!   "client": "Alpha LongTail LLC",
//!   "max_retries": 3,
//!   "output": "report.md",
//!   "run_log": true,
//!   "llm": { "provider": "openai", "model": "gpt-4o-mini" }
//! }
//! ```

pub mod resolution;

pub use resolution::{ConfigLevel, ConfigLoader, ConfigSource, InheritanceChain};

use crate::error::{FlowError, Result};
use crate::flow::decision::{DEFAULT_MAX_RETRIES, MAX_RETRY_BUDGET};
use crate::llm::{LlmConfig, LlmProvider, OpenAiModel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Workflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Client to research. Required for `run`; there is no default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    /// Retry budget, fixed for the whole run.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Where the accepted artifact is written, relative to the project.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Append run events to `.csm/runs.jsonl`.
    #[serde(default = "default_true")]
    pub run_log: bool,

    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_output() -> PathBuf {
    PathBuf::from("report.md")
}

fn default_true() -> bool {
    true
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            client: None,
            max_retries: default_max_retries(),
            output: default_output(),
            run_log: true,
            llm: LlmConfig::default(),
        }
    }
}

impl FlowConfig {
    /// Load layered settings for a project directory.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Config`] if a settings file is unreadable or
    /// malformed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        ConfigLoader::new().load(project_dir)
    }

    /// Get the project settings path.
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".csm/settings.json")
    }

    /// Resolve the output path against the project directory.
    pub fn output_path(&self, project_dir: &Path) -> PathBuf {
        if self.output.is_absolute() {
            self.output.clone()
        } else {
            project_dir.join(&self.output)
        }
    }

    /// Get the client, failing if none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Config`] if the client is missing or blank.
    pub fn require_client(&self) -> Result<&str> {
        self.client
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                FlowError::config(
                    "No client configured. Pass --client, set CSM_CLIENT, or add \"client\" to .csm/settings.json",
                )
            })
    }

    /// Apply command-line overrides on top of the loaded settings.
    ///
    /// A Claude model alias or `claude-*` id also switches the provider.
    pub fn apply_overrides(&mut self, client: Option<String>, model: Option<String>) {
        if let Some(client) = client {
            self.client = Some(client);
        }
        if let Some(model) = model {
            let lower = model.to_lowercase();
            if matches!(lower.as_str(), "opus" | "sonnet" | "haiku") || lower.starts_with("claude")
            {
                self.llm.provider = LlmProvider::Claude;
            } else if OpenAiModel::parse(&model).is_some() {
                self.llm.provider = LlmProvider::OpenAi;
            }
            self.llm.model = Some(model);
        }
    }

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRY_BUDGET {
            return Err(FlowError::invalid_config(
                "max_retries",
                format!("must be at most {}, got {}", MAX_RETRY_BUDGET, self.max_retries),
            ));
        }

        if let Some(ref client) = self.client {
            if client.trim().is_empty() {
                return Err(FlowError::invalid_config("client", "must not be blank"));
            }
        }

        if self.output.as_os_str().is_empty() {
            return Err(FlowError::invalid_config("output", "must not be empty"));
        }

        self.llm
            .validate()
            .map_err(|(field, reason)| FlowError::invalid_config(field, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.client, None);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.output, PathBuf::from("report.md"));
        assert!(config.run_log);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: FlowConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FlowConfig::default());
    }

    #[test]
    fn test_deserialize_full() {
        let json = r#"{
            "client": "Alpha LongTail LLC",
            "max_retries": 1,
            "output": "out/csm.md",
            "run_log": false,
            "llm": {"provider": "claude", "model": "opus"}
        }"#;
        let config: FlowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.require_client().unwrap(), "Alpha LongTail LLC");
        assert_eq!(config.max_retries, 1);
        assert!(!config.run_log);
        assert_eq!(config.llm.provider, LlmProvider::Claude);
    }

    #[test]
    fn test_serialize_omits_missing_client() {
        let json = serde_json::to_value(FlowConfig::default()).unwrap();
        assert!(json.get("client").is_none());
        assert_eq!(json["max_retries"], 3);
    }

    #[test]
    fn test_require_client() {
        assert!(FlowConfig::default().require_client().is_err());

        let blank = FlowConfig {
            client: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.require_client().is_err());
        assert!(blank.validate().is_err());

        let set = FlowConfig {
            client: Some(" Acme ".into()),
            ..Default::default()
        };
        assert_eq!(set.require_client().unwrap(), "Acme");
    }

    #[test]
    fn test_validate_max_retries_bound() {
        let ok = FlowConfig {
            max_retries: MAX_RETRY_BUDGET,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let too_many = FlowConfig {
            max_retries: MAX_RETRY_BUDGET + 1,
            ..Default::default()
        };
        match too_many.validate().unwrap_err() {
            FlowError::InvalidConfig { field, .. } => assert_eq!(field, "max_retries"),
            other => panic!("Wrong error variant: {:?}", other),
        }
    }

    #[test]
    fn test_validate_zero_retries_allowed() {
        let config = FlowConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_llm_field() {
        let mut config = FlowConfig::default();
        config.llm.temperature = -1.0;
        match config.validate().unwrap_err() {
            FlowError::InvalidConfig { field, .. } => assert_eq!(field, "llm.temperature"),
            other => panic!("Wrong error variant: {:?}", other),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = FlowConfig::default();
        config.apply_overrides(Some("Acme".into()), Some("opus".into()));
        assert_eq!(config.client.as_deref(), Some("Acme"));
        assert_eq!(config.llm.provider, LlmProvider::Claude);
        assert_eq!(config.llm.effective_model(), "opus");

        config.apply_overrides(None, Some("gpt-4o".into()));
        assert_eq!(config.client.as_deref(), Some("Acme"));
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.effective_model(), "gpt-4o");
    }

    #[test]
    fn test_output_path() {
        let config = FlowConfig::default();
        assert_eq!(
            config.output_path(Path::new("/work")),
            PathBuf::from("/work/report.md")
        );

        let absolute = FlowConfig {
            output: PathBuf::from("/tmp/csm.md"),
            ..Default::default()
        };
        assert_eq!(
            absolute.output_path(Path::new("/work")),
            PathBuf::from("/tmp/csm.md")
        );
    }
}
