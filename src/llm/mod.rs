//! LLM client abstraction layer.
//!
//! The crews talk to a language model only through the [`LlmClient`] trait,
//! so the backend is chosen at runtime from [`LlmConfig`]:
//!
//! - [`OpenAiProvider`]: OpenAI chat completions (default)
//! - [`ClaudeClient`]: the `claude` CLI in print mode
//! - [`MockLlmClient`]: canned responses for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use csm_flow::llm::{create_llm_client, LlmConfig};
//!
//! let client = create_llm_client(&LlmConfig::default(), Path::new("."))?;
//! let response = client.run_with_system("You are terse.", "Say hi").await?;
//! ```

pub mod openai;

pub use openai::{OpenAiApiError, OpenAiModel, OpenAiProvider};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Abstraction for LLM client operations.
///
/// Object-safe and `Send + Sync`, so clients are shared as
/// `Arc<dyn LlmClient>` between the researcher and review crews.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a prompt and return the model's response.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, authentication
    /// fails, or the request times out.
    async fn run_prompt(&self, prompt: &str) -> Result<String>;

    /// Run a prompt with a separate system message.
    ///
    /// Backends without a system role get both parts joined into one prompt.
    async fn run_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.run_prompt(&format!("{}\n\n{}", system, prompt)).await
    }

    /// Get the name of the model being used.
    fn model_name(&self) -> &str;
}

/// Client for the `claude` CLI.
///
/// Prompts are piped to `claude -p` on stdin and stdout is returned.
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    /// Working directory for the CLI.
    project_dir: PathBuf,
    /// Model alias passed to `--model`.
    model: String,
    timeout: Duration,
}

impl ClaudeClient {
    /// Default model alias.
    pub const DEFAULT_MODEL: &'static str = "sonnet";

    /// Create a client running in `project_dir`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(LlmConfig::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the model alias ("opus", "sonnet", "haiku") or full model id.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set the per-prompt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    /// Check whether the `claude` binary is on `PATH`.
    pub fn is_available() -> bool {
        which::which("claude").is_ok()
    }

    async fn execute(&self, prompt: &str) -> Result<String> {
        let mut child = AsyncCommand::new("claude")
            .args(["-p", "--model", &self.model, "--output-format", "text"])
            .current_dir(&self.project_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn claude")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.flush().await?;
            drop(stdin);
        }

        let output = child.wait_with_output().await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            anyhow::bail!(
                "Claude process exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )
        }
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    async fn run_prompt(&self, prompt: &str) -> Result<String> {
        debug!(
            "Running Claude with model {} ({} chars prompt)",
            self.model,
            prompt.len()
        );

        tokio::time::timeout(self.timeout, self.execute(prompt))
            .await
            .map_err(|_| {
                anyhow::anyhow!("Claude timed out after {}s", self.timeout.as_secs())
            })?
    }

    fn model_name(&self) -> &str {
        match self.model.as_str() {
            "opus" => "claude-opus-4",
            "sonnet" => "claude-sonnet-4",
            "haiku" => "claude-haiku-3.5",
            other => other,
        }
    }
}

/// Mock LLM client for testing.
///
/// Responses are consumed in order and the last one repeats. Every prompt
/// is recorded.
///
/// # Example
///
/// ```rust,ignore
/// let client = MockLlmClient::new()
///     .with_response("draft")
///     .with_fail_count(1, "rate limited");
///
/// assert!(client.run_prompt("p").await.is_err());
/// assert_eq!(client.run_prompt("p").await.unwrap(), "draft");
/// ```
#[derive(Debug)]
pub struct MockLlmClient {
    responses: Vec<String>,
    error: Option<String>,
    model: String,
    call_count: AtomicU32,
    /// Number of calls to fail before succeeding.
    fail_count: AtomicU32,
    fail_error: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            error: None,
            model: "mock-llm".to_string(),
            call_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(0),
            fail_error: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl MockLlmClient {
    /// Create a new mock client with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response.
    #[must_use]
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses.push(response.to_string());
        self
    }

    /// Configure the mock to always return an error.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model_name(mut self, name: &str) -> Self {
        self.model = name.to_string();
        self
    }

    /// Configure the mock to fail the first N calls, then succeed.
    #[must_use]
    pub fn with_fail_count(mut self, count: u32, error: &str) -> Self {
        self.fail_count = AtomicU32::new(count);
        self.fail_error = Some(error.to_string());
        self
    }

    /// Get the number of times `run_prompt` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn run_prompt(&self, prompt: &str) -> Result<String> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if self.fail_count.load(Ordering::SeqCst) > 0 {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("{}", self.fail_error.as_deref().unwrap_or("Mock failure"))
        }

        if let Some(ref error) = self.error {
            anyhow::bail!("{}", error)
        }

        let last = self.responses.len().saturating_sub(1);
        Ok(self
            .responses
            .get((index as usize).min(last))
            .cloned()
            .unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

/// LLM backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Claude,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Claude => write!(f, "claude"),
        }
    }
}

/// Configuration for LLM backend selection.
///
/// Loaded from the `llm` section of the settings file.
///
/// ```json
/// {
///   "llm": {
///     "provider": "openai",
///     "model": "gpt-4o",
///     "temperature": 0.2
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name. `None` picks the provider's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Environment variable holding the OpenAI API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// OpenAI attempts per prompt; transient failures are retried.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// OpenAI-compatible API base URL (Azure OpenAI, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

fn default_api_key_env() -> String {
    OpenAiProvider::DEFAULT_API_KEY_ENV.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    LlmConfig::DEFAULT_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    OpenAiProvider::DEFAULT_MAX_ATTEMPTS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            api_base: None,
        }
    }
}

impl LlmConfig {
    /// Default request timeout (2 minutes).
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Most attempts a single prompt may take.
    pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

    /// The model to use, falling back to the provider default.
    #[must_use]
    pub fn effective_model(&self) -> String {
        match (&self.model, self.provider) {
            (Some(model), _) => model.clone(),
            (None, LlmProvider::OpenAi) => OpenAiModel::default().model_id().to_string(),
            (None, LlmProvider::Claude) => ClaudeClient::DEFAULT_MODEL.to_string(),
        }
    }

    /// Validate the LLM configuration.
    ///
    /// # Errors
    ///
    /// Returns `(field, reason)` for the first invalid field.
    pub fn validate(&self) -> std::result::Result<(), (&'static str, String)> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err((
                "llm.temperature",
                format!("must be between 0.0 and 2.0, got {}", self.temperature),
            ));
        }
        if self.max_tokens == 0 {
            return Err(("llm.max_tokens", "must be greater than 0".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(("llm.timeout_secs", "must be greater than 0".to_string()));
        }
        if !(1..=Self::MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err((
                "llm.max_attempts",
                format!(
                    "must be between 1 and {}, got {}",
                    Self::MAX_ATTEMPTS_LIMIT,
                    self.max_attempts
                ),
            ));
        }
        if let Some(ref base) = self.api_base {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err((
                    "llm.api_base",
                    format!("must be an http(s) URL, got '{}'", base),
                ));
            }
        }

        match self.provider {
            LlmProvider::OpenAi => {
                let model = self.effective_model();
                if OpenAiModel::parse(&model).is_none() {
                    return Err((
                        "llm.model",
                        format!(
                            "unknown OpenAI model '{}'. Valid options: {}",
                            model,
                            OpenAiModel::ALL
                                .iter()
                                .map(|m| m.model_id())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    ));
                }
                if self.api_key_env.trim().is_empty() {
                    return Err(("llm.api_key_env", "must not be empty".to_string()));
                }
            }
            LlmProvider::Claude => {
                if self.effective_model().trim().is_empty() {
                    return Err(("llm.model", "must not be empty".to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Create an LLM client from configuration.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the selected backend
/// is not installed.
pub fn create_llm_client(config: &LlmConfig, project_dir: &Path) -> Result<Arc<dyn LlmClient>> {
    config
        .validate()
        .map_err(|(field, reason)| anyhow::anyhow!("Invalid {}: {}", field, reason))?;

    let model = config.effective_model();
    match config.provider {
        LlmProvider::OpenAi => {
            let provider = OpenAiProvider::new(OpenAiModel::parse(&model).unwrap_or_default())
                .with_api_key_env(&config.api_key_env)
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens)
                .with_timeout(config.timeout_secs)
                .with_max_attempts(config.max_attempts);
            let provider = match config.api_base {
                Some(ref base) => provider.with_api_base(base),
                None => provider,
            };
            Ok(Arc::new(provider))
        }
        LlmProvider::Claude => {
            if !ClaudeClient::is_available() {
                anyhow::bail!(
                    "The 'claude' CLI was not found on PATH. Install it or set \"provider\": \"openai\""
                );
            }
            let client = ClaudeClient::new(project_dir)
                .with_model(&model)
                .with_timeout(config.timeout_secs);
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // LlmConfig Tests
    // =========================================================================

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, LlmProvider::OpenAi);
        assert_eq!(config.effective_model(), "gpt-4o-mini");
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.max_attempts, 3);
        assert!(config.api_base.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_config_deserialize_empty() {
        let config: LlmConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LlmConfig::default());
    }

    #[test]
    fn test_llm_config_deserialize_partial() {
        let config: LlmConfig =
            serde_json::from_str(r#"{"provider": "claude", "max_tokens": 500}"#).unwrap();
        assert_eq!(config.provider, LlmProvider::Claude);
        assert_eq!(config.effective_model(), "sonnet");
        assert_eq!(config.max_tokens, 500);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_llm_config_unknown_provider_fails() {
        let result = serde_json::from_str::<LlmConfig>(r#"{"provider": "gemini"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_llm_config_validate_unknown_openai_model() {
        let config = LlmConfig {
            model: Some("gpt-99".into()),
            ..Default::default()
        };
        let (field, reason) = config.validate().unwrap_err();
        assert_eq!(field, "llm.model");
        assert!(reason.contains("gpt-4o-mini"));
    }

    #[test]
    fn test_llm_config_validate_ranges() {
        let hot = LlmConfig {
            temperature: 3.5,
            ..Default::default()
        };
        assert_eq!(hot.validate().unwrap_err().0, "llm.temperature");

        let empty = LlmConfig {
            max_tokens: 0,
            ..Default::default()
        };
        assert_eq!(empty.validate().unwrap_err().0, "llm.max_tokens");

        let instant = LlmConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(instant.validate().unwrap_err().0, "llm.timeout_secs");

        let no_attempts = LlmConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(no_attempts.validate().unwrap_err().0, "llm.max_attempts");

        let relentless = LlmConfig {
            max_attempts: LlmConfig::MAX_ATTEMPTS_LIMIT + 1,
            ..Default::default()
        };
        assert_eq!(relentless.validate().unwrap_err().0, "llm.max_attempts");
    }

    #[test]
    fn test_llm_config_api_base() {
        let config: LlmConfig =
            serde_json::from_str(r#"{"api_base": "https://proxy.internal/v1/", "max_attempts": 1}"#)
                .unwrap();
        assert_eq!(config.max_attempts, 1);
        assert!(config.validate().is_ok());
        assert!(create_llm_client(&config, Path::new(".")).is_ok());

        let bad = LlmConfig {
            api_base: Some("proxy.internal".into()),
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err().0, "llm.api_base");
    }

    #[test]
    fn test_create_openai_client() {
        let config = LlmConfig {
            model: Some("gpt-4o".into()),
            ..Default::default()
        };
        let client = create_llm_client(&config, Path::new(".")).unwrap();
        assert_eq!(client.model_name(), "gpt-4o");
    }

    #[test]
    fn test_create_client_rejects_invalid_config() {
        let config = LlmConfig {
            model: Some("nope".into()),
            ..Default::default()
        };
        let err = create_llm_client(&config, Path::new(".")).err().unwrap();
        assert!(err.to_string().contains("llm.model"));
    }

    // =========================================================================
    // ClaudeClient Tests
    // =========================================================================

    #[test]
    fn test_claude_model_names() {
        let client = ClaudeClient::new(".");
        assert_eq!(client.model_name(), "claude-sonnet-4");
        assert_eq!(client.clone().with_model("opus").model_name(), "claude-opus-4");
        assert_eq!(
            client.with_model("claude-3-7-sonnet").model_name(),
            "claude-3-7-sonnet"
        );
    }

    // =========================================================================
    // MockLlmClient Tests
    // =========================================================================

    #[tokio::test]
    async fn test_mock_responses_in_order() {
        let client = MockLlmClient::new()
            .with_response("first")
            .with_response("second");

        assert_eq!(client.run_prompt("a").await.unwrap(), "first");
        assert_eq!(client.run_prompt("b").await.unwrap(), "second");
        assert_eq!(client.run_prompt("c").await.unwrap(), "second");
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_mock_fail_count() {
        let client = MockLlmClient::new()
            .with_response("ok")
            .with_fail_count(2, "rate limited");

        assert!(client.run_prompt("p").await.is_err());
        assert!(client.run_prompt("p").await.is_err());
        assert_eq!(client.run_prompt("p").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_mock_permanent_error() {
        let client = MockLlmClient::new().with_error("offline");
        let err = client.run_prompt("p").await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn test_default_run_with_system_concatenates() {
        let client = MockLlmClient::new().with_response("ok");
        client.run_with_system("SYSTEM", "USER").await.unwrap();
        assert_eq!(client.prompts()[0], "SYSTEM\n\nUSER");
    }

    #[test]
    fn test_clients_are_object_safe() {
        let _clients: Vec<Arc<dyn LlmClient>> = vec![
            Arc::new(MockLlmClient::new()),
            Arc::new(ClaudeClient::new(".")),
            Arc::new(OpenAiProvider::new(OpenAiModel::default())),
        ];
    }
}
