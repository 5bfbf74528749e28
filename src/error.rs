//! Custom error types for csm-flow.
//!
//! This module provides the error taxonomy of the review-retry workflow.
//! Step failures (generation, review) are fatal to a run and are never
//! retried by the step that raised them; only a review *rejection* is
//! retried, and that is not an error at all.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for csm-flow operations
#[derive(Error, Debug)]
pub enum FlowError {
    // =========================================================================
    // Step Errors
    // =========================================================================
    /// The generation collaborator errored or returned an empty artifact
    #[error("Generation failed: {message}")]
    GenerationFailed { message: String },

    /// The review result could not be parsed into a review outcome
    #[error("Review result malformed: {message}")]
    ReviewMalformed { message: String, raw: String },

    /// The review collaborator itself errored
    #[error("Review failed: {message}")]
    ReviewFailed { message: String },

    /// A step was called with input that violates its contract
    #[error("Invalid input for {step}: {reason}")]
    InvalidInput { step: String, reason: String },

    // =========================================================================
    // Run Outcome Errors
    // =========================================================================
    /// Retry budget exhausted without an accepted artifact
    #[error("Max retries ({max_retries}) exceeded after {cycles} cycles")]
    MaxRetriesExceeded {
        max_retries: u32,
        cycles: u32,
        feedback: Option<String>,
    },

    /// The Save or Abort collaborator failed
    #[error("Collaborator '{collaborator}' failed: {message}")]
    FatalCollaborator {
        collaborator: String,
        message: String,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a generation failure
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
        }
    }

    /// Create a malformed review error, keeping the raw text for diagnostics
    pub fn review_malformed(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ReviewMalformed {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Create a review transport failure
    pub fn review_failed(message: impl Into<String>) -> Self {
        Self::ReviewFailed {
            message: message.into(),
        }
    }

    /// Create an input contract violation
    pub fn invalid_input(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Create a collaborator failure
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FatalCollaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error was raised by a generation or review step
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailed { .. }
                | Self::ReviewMalformed { .. }
                | Self::ReviewFailed { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Check if this error terminates a run abnormally.
    ///
    /// `MaxRetriesExceeded` is a normal terminal outcome and is not fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MaxRetriesExceeded { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MaxRetriesExceeded { .. } => 3,
            Self::GenerationFailed { .. } => 4,
            Self::ReviewMalformed { .. } | Self::ReviewFailed { .. } => 5,
            Self::FatalCollaborator { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for csm-flow results
pub type Result<T> = std::result::Result<T, FlowError>;

/// How the CLI reports an error that ended a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Process exit code.
    pub code: i32,
    /// Error message, or `None` when the outcome was already reported.
    pub message: Option<String>,
    /// Follow-up suggestion for the user.
    pub hint: Option<&'static str>,
}

impl ExitReport {
    /// Build the report for an error returned by a command.
    ///
    /// A spent retry budget exits with its own code but no message: the
    /// abort notifier has already announced it.
    pub fn from_error(error: &anyhow::Error) -> Self {
        let Some(flow_error) = error.downcast_ref::<FlowError>() else {
            return Self {
                code: 1,
                message: Some(format!("{:#}", error)),
                hint: None,
            };
        };

        let hint = if flow_error.is_step_failure() {
            Some("Rerun with --verbose to see each step's collaborator call")
        } else if matches!(
            flow_error,
            FlowError::Config { .. } | FlowError::InvalidConfig { .. }
        ) {
            Some("Inspect the merged settings with `csm-flow config show`")
        } else {
            None
        };

        Self {
            code: flow_error.exit_code(),
            message: flow_error.is_fatal().then(|| format!("{:#}", error)),
            hint,
        }
    }
}

/// Extension trait for converting collaborator errors to `FlowError`
pub trait IntoFlowError<T> {
    fn into_flow_config(self) -> Result<T>;
    fn into_flow_collaborator(self, name: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoFlowError<T> for std::result::Result<T, E> {
    fn into_flow_config(self) -> Result<T> {
        self.map_err(|e| FlowError::config(e.into().to_string()))
    }

    fn into_flow_collaborator(self, name: &str) -> Result<T> {
        self.map_err(|e| FlowError::collaborator(name, format!("{:#}", e.into())))
    }
}
