//! OpenAI chat completions provider.
//!
//! Requests go through a `curl` subprocess, so no HTTP client dependency is
//! needed. The request body is written to curl's stdin and the API key to a
//! private config file, so neither appears on the command line. API errors
//! are classified into [`OpenAiApiError`], and transient ones are retried.

use crate::llm::LlmClient;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Upper bound on any single retry delay.
const MAX_BACKOFF_SECS: u64 = 60;

// =============================================================================
// OpenAI Model Variants
// =============================================================================

/// Supported OpenAI model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OpenAiModel {
    /// GPT-4o Mini - fast, affordable small model
    #[default]
    Gpt4oMini,
    /// GPT-4o - flagship model
    Gpt4o,
    /// GPT-4 Turbo - previous generation flagship
    Gpt4Turbo,
}

impl OpenAiModel {
    /// Every supported variant.
    pub const ALL: [OpenAiModel; 3] = [Self::Gpt4oMini, Self::Gpt4o, Self::Gpt4Turbo];

    /// Get the full model ID for API calls.
    ///
    /// ```rust
    /// use csm_flow::llm::openai::OpenAiModel;
    ///
    /// assert_eq!(OpenAiModel::Gpt4oMini.model_id(), "gpt-4o-mini");
    /// ```
    #[must_use]
    pub const fn model_id(&self) -> &'static str {
        match self {
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4Turbo => "gpt-4-turbo",
        }
    }

    /// Parse a model name, accepting common spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gpt-4o-mini" | "gpt4o-mini" | "4o-mini" => Some(Self::Gpt4oMini),
            "gpt-4o" | "gpt4o" | "4o" => Some(Self::Gpt4o),
            "gpt-4-turbo" | "gpt4-turbo" | "gpt-4" | "gpt4" => Some(Self::Gpt4Turbo),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_id())
    }
}

// =============================================================================
// OpenAI API Errors
// =============================================================================

/// Errors specific to OpenAI API interactions.
#[derive(Error, Debug)]
pub enum OpenAiApiError {
    #[error("Rate limit exceeded: {message} (retry after {retry_after_secs}s)")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("API key not found in environment variable '{env_var}'")]
    ApiKeyNotFound { env_var: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// May be transient.
    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Invalid API response: {message}")]
    InvalidResponse { message: String },
}

impl OpenAiApiError {
    /// Check if a later attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Timeout { .. }
                | Self::ConnectionError { .. }
        )
    }

    /// Delay before attempt `attempt + 1`, or `None` if retrying is pointless.
    ///
    /// Rate limits wait as long as the API asked; other transient failures
    /// back off exponentially. Both are capped at one minute.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        let secs = match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => 2u64.saturating_pow(attempt),
        };
        Some(Duration::from_secs(secs.min(MAX_BACKOFF_SECS)))
    }

    /// Classify an `error` object from an API response body.
    pub fn from_api_error(error_type: &str, message: &str) -> Self {
        let message_lower = message.to_lowercase();
        if error_type.contains("rate_limit") || message_lower.contains("rate limit") {
            Self::RateLimited {
                message: message.to_string(),
                retry_after_secs: Self::extract_retry_after(message).unwrap_or(60),
            }
        } else if error_type.contains("authentication")
            || error_type == "invalid_api_key"
            || message_lower.contains("api key")
        {
            Self::AuthenticationFailed {
                message: message.to_string(),
            }
        } else if error_type.contains("server_error") {
            Self::ServerError {
                message: message.to_string(),
            }
        } else {
            Self::InvalidRequest {
                message: message.to_string(),
            }
        }
    }

    /// Extract retry-after seconds from an error message.
    fn extract_retry_after(message: &str) -> Option<u64> {
        let patterns = [r"retry.?after[:\s]+(\d+)", r"try again in (\d+)", r"(\d+)\s*seconds?"];
        let lower = message.to_lowercase();

        patterns.iter().find_map(|pattern| {
            regex::Regex::new(pattern)
                .ok()?
                .captures(&lower)?
                .get(1)?
                .as_str()
                .parse::<u64>()
                .ok()
        })
    }
}

// =============================================================================
// OpenAI API Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

// =============================================================================
// OpenAI Provider
// =============================================================================

/// OpenAI LLM provider.
///
/// # Example
///
/// ```rust,ignore
/// let provider = OpenAiProvider::new(OpenAiModel::Gpt4oMini)
///     .with_temperature(0.2);
/// let response = provider.run_prompt("Hello!").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    model: OpenAiModel,
    /// Environment variable name for the API key.
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
    api_base: String,
    /// Total attempts per prompt, including the first.
    max_attempts: u32,
}

impl OpenAiProvider {
    /// Default API base URL.
    pub const DEFAULT_API_BASE: &'static str = "https://api.openai.com/v1";

    /// Default API key environment variable.
    pub const DEFAULT_API_KEY_ENV: &'static str = "OPENAI_API_KEY";

    /// Default number of attempts per prompt.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Create a provider for `model` with default sampling settings.
    #[must_use]
    pub fn new(model: OpenAiModel) -> Self {
        Self {
            model,
            api_key_env: Self::DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 120,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_api_key_env(mut self, env_var: &str) -> Self {
        self.api_key_env = env_var.to_string();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set a custom API base URL (for Azure OpenAI or proxies).
    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Set the number of attempts per prompt. Values below 1 mean 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Get the current model.
    #[must_use]
    pub fn model(&self) -> OpenAiModel {
        self.model
    }

    fn api_key(&self) -> Result<String, OpenAiApiError> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| OpenAiApiError::ApiKeyNotFound {
                env_var: self.api_key_env.clone(),
            })
    }

    fn build_request(&self, system: Option<&str>, prompt: &str) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", prompt));

        ChatCompletionRequest {
            model: self.model.model_id().to_string(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Send a request, retrying transient failures.
    async fn execute(&self, system: Option<&str>, prompt: &str) -> Result<String, OpenAiApiError> {
        let mut attempt = 1;
        loop {
            match self.send(system, prompt).await {
                Err(e) if attempt < self.max_attempts => match e.retry_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            "OpenAI request failed ({}), retrying in {}s (attempt {}/{})",
                            e,
                            delay.as_secs(),
                            attempt + 1,
                            self.max_attempts
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                result => return result,
            }
        }
    }

    async fn send(&self, system: Option<&str>, prompt: &str) -> Result<String, OpenAiApiError> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(system, prompt);

        debug!(
            "Sending request to OpenAI {} ({} chars prompt)",
            self.model,
            prompt.len()
        );

        let body_json =
            serde_json::to_string(&request).map_err(|e| OpenAiApiError::InvalidRequest {
                message: format!("Failed to serialize request: {}", e),
            })?;

        let auth_config = write_auth_config(&api_key)?;

        let mut child = tokio::process::Command::new("curl")
            .args(["-sS", "-X", "POST", &url, "-K"])
            .arg(auth_config.path())
            .args([
                "-H",
                "Content-Type: application/json",
                "--data-binary",
                "@-",
                "--max-time",
                &self.timeout_secs.to_string(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OpenAiApiError::ConnectionError {
                message: format!("Failed to execute curl: {}", e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(body_json.as_bytes())
                .await
                .map_err(|e| OpenAiApiError::ConnectionError {
                    message: format!("Failed to send request body to curl: {}", e),
                })?;
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OpenAiApiError::ConnectionError {
                message: format!("Failed to wait for curl: {}", e),
            })?;

        if !output.status.success() {
            // curl exit code 28 is "operation timed out"
            if output.status.code() == Some(28) {
                return Err(OpenAiApiError::Timeout {
                    timeout_secs: self.timeout_secs,
                });
            }
            return Err(OpenAiApiError::ConnectionError {
                message: format!(
                    "curl failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        parse_response(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Write the Authorization header to a curl config file readable only by
/// the current user. The file is removed when the handle drops.
fn write_auth_config(api_key: &str) -> Result<tempfile::NamedTempFile, OpenAiApiError> {
    let config_error = |e: std::io::Error| OpenAiApiError::ConnectionError {
        message: format!("Failed to write curl config: {}", e),
    };

    let mut file = tempfile::Builder::new()
        .prefix("csm-flow-curl-")
        .tempfile()
        .map_err(config_error)?;
    writeln!(
        file,
        "header = \"Authorization: Bearer {}\"",
        curl_config_escape(api_key)
    )
    .map_err(config_error)?;
    file.flush().map_err(config_error)?;

    Ok(file)
}

/// Escape a value for a double-quoted curl config string.
fn curl_config_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract the first choice's content, or classify an `error` body.
fn parse_response(body: &str) -> Result<String, OpenAiApiError> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            let error_type = error
                .get("type")
                .or_else(|| error.get("code"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            return Err(OpenAiApiError::from_api_error(error_type, message));
        }
    }

    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| OpenAiApiError::InvalidResponse {
            message: format!("Failed to parse response: {}", e),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| OpenAiApiError::InvalidResponse {
            message: "response contained no choices".to_string(),
        })
}

#[async_trait]
impl LlmClient for OpenAiProvider {
    async fn run_prompt(&self, prompt: &str) -> Result<String> {
        Ok(self.execute(None, prompt).await?)
    }

    async fn run_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        Ok(self.execute(Some(system), prompt).await?)
    }

    fn model_name(&self) -> &str {
        self.model.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_model_parse() {
        assert_eq!(OpenAiModel::parse("gpt-4o-mini"), Some(OpenAiModel::Gpt4oMini));
        assert_eq!(OpenAiModel::parse("GPT-4o"), Some(OpenAiModel::Gpt4o));
        assert_eq!(OpenAiModel::parse("gpt-4"), Some(OpenAiModel::Gpt4Turbo));
        assert_eq!(OpenAiModel::parse("o1"), None);
        assert_eq!(OpenAiModel::default(), OpenAiModel::Gpt4oMini);
    }

    #[test]
    fn test_request_includes_system_message() {
        let provider = OpenAiProvider::new(OpenAiModel::Gpt4o)
            .with_temperature(0.2)
            .with_max_tokens(256);
        let request = provider.build_request(Some("be strict"), "review this");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be strict");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_request_without_system_message() {
        let provider = OpenAiProvider::new(OpenAiModel::default());
        let request = provider.build_request(None, "hello");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.max_tokens, 1000);
    }

    #[test]
    fn test_parse_response_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hi"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "hi");
    }

    #[test]
    fn test_parse_response_no_choices() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, OpenAiApiError::InvalidResponse { .. }));
    }

    #[test]
    fn test_parse_response_rate_limit() {
        let body = r#"{"error": {"type": "rate_limit_exceeded", "message": "Please try again in 20 seconds"}}"#;
        match parse_response(body).unwrap_err() {
            OpenAiApiError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 20),
            other => panic!("Wrong error variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_auth_error() {
        let body = r#"{"error": {"code": "invalid_api_key", "message": "Incorrect API key provided"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, OpenAiApiError::AuthenticationFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_retryability() {
        assert!(OpenAiApiError::from_api_error("server_error", "oops").is_retryable());
        assert!(!OpenAiApiError::from_api_error("invalid_request_error", "bad").is_retryable());
        assert!(OpenAiApiError::Timeout { timeout_secs: 5 }.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let provider = OpenAiProvider::new(OpenAiModel::default())
            .with_api_key_env("CSM_FLOW_TEST_KEY_THAT_IS_NEVER_SET");
        let err = provider.run_prompt("hi").await.unwrap_err();
        assert!(err.to_string().contains("CSM_FLOW_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_retry_delay() {
        let limited = OpenAiApiError::RateLimited {
            message: "slow down".into(),
            retry_after_secs: 20,
        };
        assert_eq!(limited.retry_delay(1), Some(Duration::from_secs(20)));

        let long_wait = OpenAiApiError::RateLimited {
            message: "slow down".into(),
            retry_after_secs: 600,
        };
        assert_eq!(long_wait.retry_delay(1), Some(Duration::from_secs(60)));

        let server = OpenAiApiError::ServerError {
            message: "overloaded".into(),
        };
        assert_eq!(server.retry_delay(1), Some(Duration::from_secs(2)));
        assert_eq!(server.retry_delay(2), Some(Duration::from_secs(4)));
        assert_eq!(server.retry_delay(40), Some(Duration::from_secs(60)));

        let auth = OpenAiApiError::AuthenticationFailed {
            message: "bad key".into(),
        };
        assert_eq!(auth.retry_delay(1), None);
    }

    #[test]
    fn test_max_attempts_floor() {
        let provider = OpenAiProvider::new(OpenAiModel::default()).with_max_attempts(0);
        assert_eq!(provider.max_attempts, 1);
    }

    #[test]
    fn test_curl_config_escape() {
        assert_eq!(curl_config_escape("sk-abc"), "sk-abc");
        assert_eq!(curl_config_escape(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[test]
    fn test_auth_config_file() {
        let file = write_auth_config("sk-secret").unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "header = \"Authorization: Bearer sk-secret\"\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_large_request_body_reaches_curl() {
        if which::which("curl").is_err() {
            return;
        }

        std::env::set_var("CSM_FLOW_TEST_LARGE_BODY_KEY", "sk-test");
        let provider = OpenAiProvider::new(OpenAiModel::default())
            .with_api_key_env("CSM_FLOW_TEST_LARGE_BODY_KEY")
            .with_api_base("http://127.0.0.1:9")
            .with_timeout(5)
            .with_max_attempts(1);

        // Well past the 128 KiB limit on a single command-line argument
        let prompt = "x".repeat(200 * 1024);
        let err = provider.run_prompt(&prompt).await.unwrap_err().to_string();

        assert!(err.starts_with("Connection error"), "unexpected error: {}", err);
        assert!(!err.contains("Failed to execute curl"), "curl never started: {}", err);
        assert!(!err.contains("Argument list too long"));
    }

    #[test]
    fn test_custom_api_base_trims_slash() {
        let provider =
            OpenAiProvider::new(OpenAiModel::default()).with_api_base("http://localhost:8080/v1/");
        assert_eq!(provider.api_base, "http://localhost:8080/v1");
    }
}
