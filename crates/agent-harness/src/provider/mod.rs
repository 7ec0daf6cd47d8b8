//! Model Provider Strategy Pattern
//!
//! The harness talks to a language model only through these traits. A
//! provider opens one [`ModelSession`] per agent instance; the session runs
//! dispatch rounds, calling tools through the [`Toolbox`] it was given.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_harness::provider::{ModelProvider, SessionConfig};
//!
//! let session = provider.create_session(config)?;
//! let response = session.run(request).await?;
//! ```

mod scripted;

pub use scripted::{RunRecord, ScriptedProvider, ScriptedRound, SessionRecord};

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::Toolbox;

/// Describes the structured output a round must produce
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Type name, `"text"` for plain text
    pub name: String,

    /// JSON Schema the output must satisfy (if the type provides one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl OutputSpec {
    pub fn text() -> Self {
        Self {
            name: "text".into(),
            schema: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn is_text(&self) -> bool {
        self.name == "text"
    }
}

/// A type an agent turn can produce
pub trait AgentOutput: DeserializeOwned + Send + 'static {
    fn output_spec() -> OutputSpec {
        let full = std::any::type_name::<Self>();
        OutputSpec::named(full.rsplit("::").next().unwrap_or(full))
    }
}

impl AgentOutput for String {
    fn output_spec() -> OutputSpec {
        OutputSpec::text()
    }
}

impl AgentOutput for Value {}

/// Per-round context a session passes back when it invokes tools
#[derive(Clone, Default)]
pub struct RunContext {
    deps: Option<Arc<dyn Any + Send + Sync>>,
}

impl RunContext {
    pub fn with_deps<D: Send + Sync + 'static>(deps: Option<D>) -> Self {
        Self {
            deps: deps.map(|d| Arc::new(d) as Arc<dyn Any + Send + Sync>),
        }
    }

    /// Dependencies of this round, if they were given and are of type `D`
    pub fn deps<D: Send + Sync + 'static>(&self) -> Option<Arc<D>> {
        self.deps.clone()?.downcast::<D>().ok()
    }

    pub fn has_deps(&self) -> bool {
        self.deps.is_some()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("deps", &self.deps.is_some())
            .finish()
    }
}

/// Everything a provider needs to open a session for one agent instance
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Model identifier (e.g., "llama3.2", "gpt-4", "claude-3-sonnet")
    pub model: String,

    /// Full system prompt
    pub system_prompt: String,

    /// Tools the model may call, bound to the agent instance
    pub toolbox: Toolbox,

    /// Dependency type name, when the agent declares one
    pub deps_type: Option<String>,

    /// Default output of every round
    pub output: OutputSpec,
}

/// One dispatch round
#[derive(Debug)]
pub struct RunRequest<'a> {
    /// User prompt
    pub prompt: &'a str,

    /// Every message exchanged so far, oldest first
    pub history: &'a [Message],

    /// Passed back to `Toolbox::invoke`
    pub context: RunContext,

    /// Output override for this round only
    pub output: Option<OutputSpec>,
}

/// Result of a dispatch round
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResponse {
    /// Structured output, decoded by the agent into its output type
    pub output: Value,

    /// Messages produced during the round, in order
    pub new_messages: Vec<Message>,
}

/// A session bound to one agent instance
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Run one round: prompt plus history in, output plus new messages out
    async fn run(&self, request: RunRequest<'_>) -> Result<RunResponse, ProviderError>;
}

/// Strategy trait for model providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
pub trait ModelProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Open a session configured with a system prompt, tools and output type
    fn create_session(&self, config: SessionConfig) -> Result<Box<dyn ModelSession>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Verdict {
        #[allow(dead_code)]
        ok: bool,
    }

    impl AgentOutput for Verdict {}

    #[test]
    fn test_output_specs() {
        assert!(String::output_spec().is_text());
        assert_eq!(Verdict::output_spec().name, "Verdict");
    }

    #[test]
    fn test_run_context_deps() {
        let ctx = RunContext::with_deps(Some(42_u32));
        assert_eq!(ctx.deps::<u32>().as_deref(), Some(&42));
        assert!(ctx.deps::<String>().is_none());

        let empty = RunContext::with_deps::<u32>(None);
        assert!(!empty.has_deps());
        assert!(empty.deps::<u32>().is_none());
    }
}
