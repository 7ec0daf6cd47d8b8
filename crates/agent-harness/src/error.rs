//! Error Types
//!
//! Failures are split along the isolation boundary: tool-facing errors
//! (`BindingError`, `DisplayNameError`, `ToolFailure`) never leave the tool
//! wrapper, dispatch-facing errors (`AgentError`) always reach the caller.

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// The provider round failed; history was left untouched
    #[error("Dispatch failed for prompt \"{prompt}\": {source}")]
    Dispatch {
        /// Preview of the prompt that was being sent
        prompt: String,
        #[source]
        source: ProviderError,
    },

    /// The provider produced output that does not decode into the requested type
    #[error("Provider output does not match {expected}: {source}")]
    OutputMismatch {
        expected: String,
        #[source]
        source: serde_json::Error,
    },

    /// Prompt was empty or whitespace only
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// The provider refused to open a session
    #[error("Session error: {0}")]
    Session(#[source] ProviderError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Dispatch { source, .. } | AgentError::Session(source) => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Dispatch { source, .. } => source.user_message(),
            AgentError::OutputMismatch { .. } => {
                "The AI service returned an answer in an unexpected shape.".into()
            }
            AgentError::EmptyPrompt => "Please enter a message.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

/// Errors reported by a model provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::RateLimited(_) | ProviderError::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            ProviderError::Unavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            ProviderError::RateLimited(_) => {
                "You've made too many requests. Please wait a moment.".into()
            }
            ProviderError::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Other(format!("{err:#}"))
    }
}

/// A tool call's arguments do not match the tool's declared parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("missing required argument '{0}'")]
    Missing(String),

    #[error("unexpected argument '{0}'")]
    Unexpected(String),

    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional { expected: usize, given: usize },

    #[error("argument '{name}' must be of type {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("argument '{name}' must be one of {allowed}, got {value}")]
    NotAllowed {
        name: String,
        allowed: String,
        value: String,
    },

    #[error("arguments must be an object or an array, got {0}")]
    Shape(String),
}

/// The progress label for a call could not be produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayNameError {
    #[error("display name references missing argument '{0}'")]
    MissingArgument(String),

    #[error("malformed display name template at byte {position}: {template}")]
    Malformed { template: String, position: usize },

    #[error("{0}")]
    Failed(String),
}

/// Failure at the tool-wrapper boundary.
///
/// The `Display` output is what the model sees as the tool's result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    #[error("Error in tool {tool}: invalid arguments: {source}")]
    Binding {
        tool: String,
        #[source]
        source: BindingError,
    },

    #[error("Error: {source}")]
    DisplayName {
        tool: String,
        #[source]
        source: DisplayNameError,
    },

    #[error("Error in tool {tool}: {message}")]
    Execution { tool: String, message: String },
}

impl ToolFailure {
    /// Name of the tool that failed
    pub fn tool(&self) -> &str {
        match self {
            ToolFailure::Binding { tool, .. }
            | ToolFailure::DisplayName { tool, .. }
            | ToolFailure::Execution { tool, .. } => tool,
        }
    }
}
