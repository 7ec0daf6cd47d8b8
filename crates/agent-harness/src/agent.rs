//! Agent Instance & Prompt Dispatcher
//!
//! An [`Agent`] owns one conversation: the provider session bound to its
//! tools, and the history replayed to the provider on every round.

use std::any::type_name;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DATE_INSTRUCTIONS, HarnessConfig};
use crate::error::{AgentError, ProviderError, Result};
use crate::message::History;
use crate::provider::{AgentOutput, ModelProvider, ModelSession, OutputSpec, RunContext, RunRequest, SessionConfig};
use crate::registry::{AgentDefinition, AgentType, definition};
use crate::report::{NoopReporter, ProgressReporter};
use crate::tool::{CurrentDateTool, Toolbox};
use crate::wrapper::BoundTool;

/// Unique agent instance identifier, used to correlate log lines
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user's timezone: an offset in minutes or a zone value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserTimezone {
    OffsetMinutes(i32),
    Fixed(FixedOffset),
}

impl UserTimezone {
    pub fn resolve(self) -> Result<FixedOffset> {
        match self {
            UserTimezone::Fixed(offset) => Ok(offset),
            UserTimezone::OffsetMinutes(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| {
                    AgentError::Config(format!("UTC offset of {minutes} minutes is out of range"))
                }),
        }
    }
}

impl From<i32> for UserTimezone {
    fn from(minutes: i32) -> Self {
        UserTimezone::OffsetMinutes(minutes)
    }
}

impl From<FixedOffset> for UserTimezone {
    fn from(offset: FixedOffset) -> Self {
        UserTimezone::Fixed(offset)
    }
}

impl From<Utc> for UserTimezone {
    fn from(_: Utc) -> Self {
        UserTimezone::OffsetMinutes(0)
    }
}

/// A conversational agent of type `A`
pub struct Agent<A: AgentType> {
    id: AgentId,
    state: Arc<A>,
    definition: Arc<AgentDefinition<A>>,
    history: History,
    user_timezone: FixedOffset,
    model: String,
    request_timeout: Option<Duration>,
    session: Box<dyn ModelSession>,
}

impl<A: AgentType> Agent<A> {
    /// Start building an agent around its state
    pub fn builder(state: A) -> AgentBuilder<A> {
        AgentBuilder::new(state)
    }

    /// Send a prompt and get the agent's default output
    pub async fn send_prompt(&mut self, prompt: &str) -> Result<A::Output> {
        self.dispatch(prompt, None, None).await
    }

    /// Send a prompt with dependencies for the tools of this round
    pub async fn send_prompt_with(&mut self, prompt: &str, deps: A::Deps) -> Result<A::Output> {
        self.dispatch(prompt, Some(deps), None).await
    }

    /// Send a prompt and ask for a different output type for this round only
    pub async fn send_prompt_as<T: AgentOutput>(
        &mut self,
        prompt: &str,
        deps: Option<A::Deps>,
    ) -> Result<T> {
        self.dispatch(prompt, deps, Some(T::output_spec())).await
    }

    async fn dispatch<T: AgentOutput>(
        &mut self,
        prompt: &str,
        deps: Option<A::Deps>,
        output: Option<OutputSpec>,
    ) -> Result<T> {
        let preview = prompt_preview(prompt);
        let _trace = DispatchTrace {
            agent: &self.id,
            prompt: &preview,
        };

        if prompt.trim().is_empty() {
            return Err(AgentError::EmptyPrompt);
        }

        tracing::debug!(
            agent = %self.id,
            prompt = %preview,
            history = self.history.len(),
            "Sending prompt"
        );

        let request = RunRequest {
            prompt,
            history: self.history.messages(),
            context: RunContext::with_deps(deps),
            output,
        };
        let run = self.session.run(request);
        let outcome = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
                Err(ProviderError::Unavailable(format!("no response within {limit:?}")))
            }),
            None => run.await,
        };

        let response = outcome.map_err(|source| {
            tracing::error!(agent = %self.id, prompt = %preview, error = ?source, "Error sending prompt");
            AgentError::Dispatch {
                prompt: preview.clone(),
                source,
            }
        })?;

        let decoded = serde_json::from_value::<T>(response.output).map_err(|source| {
            tracing::error!(
                agent = %self.id,
                prompt = %preview,
                expected = type_name::<T>(),
                error = %source,
                "Provider output has the wrong shape"
            );
            AgentError::OutputMismatch {
                expected: type_name::<T>().to_string(),
                source,
            }
        })?;

        self.history.append_round(response.new_messages);
        Ok(decoded)
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Conversation so far
    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    pub fn definition(&self) -> &AgentDefinition<A> {
        &self.definition
    }

    pub fn user_timezone(&self) -> FixedOffset {
        self.user_timezone
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl<A: AgentType> std::fmt::Debug for Agent<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("type", &type_name::<A>())
            .field("model", &self.model)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Logs the end of a dispatch on every exit path
struct DispatchTrace<'a> {
    agent: &'a AgentId,
    prompt: &'a str,
}

impl Drop for DispatchTrace<'_> {
    fn drop(&mut self) {
        tracing::debug!(agent = %self.agent, prompt = self.prompt, "Done sending prompt");
    }
}

fn prompt_preview(prompt: &str) -> String {
    let preview: String = prompt.chars().take(50).collect();
    if prompt.chars().count() > 50 {
        format!("{preview}...")
    } else {
        preview
    }
}

fn compose_system_prompt(type_prompt: &str, instructions: Option<String>) -> String {
    let mut prompt = format!("{DATE_INSTRUCTIONS}{type_prompt}");
    if let Some(extra) = instructions.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(&extra);
    }
    prompt
}

/// Builder for Agent configuration
pub struct AgentBuilder<A: AgentType> {
    state: A,
    provider: Option<Arc<dyn ModelProvider>>,
    reporter: Arc<dyn ProgressReporter>,
    timezone: Option<UserTimezone>,
    model: Option<String>,
    request_timeout: Option<Duration>,
    config: HarnessConfig,
}

impl<A: AgentType> AgentBuilder<A> {
    pub fn new(state: A) -> Self {
        Self {
            state,
            provider: None,
            reporter: Arc::new(NoopReporter),
            timezone: None,
            model: None,
            request_timeout: None,
            config: HarnessConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sink for tool progress labels
    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn timezone(mut self, timezone: impl Into<UserTimezone>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Defaults for anything not set explicitly on the builder
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Agent<A>> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        let user_timezone = self
            .timezone
            .unwrap_or(UserTimezone::OffsetMinutes(self.config.utc_offset_minutes))
            .resolve()?;
        let model = self.model.unwrap_or(self.config.model);
        let request_timeout = self.request_timeout.or(self.config.request_timeout);

        let definition = definition::<A>();
        let state = Arc::new(self.state);
        let id = AgentId::new();

        let mut toolbox = Toolbox::new();
        toolbox.register(Arc::new(CurrentDateTool::new(user_timezone)));
        for capability in definition.tools().iter() {
            toolbox.register(Arc::new(BoundTool::new(
                Arc::clone(capability),
                Arc::clone(&state),
                Arc::clone(&self.reporter),
                id.clone(),
            )));
        }

        let system_prompt = compose_system_prompt(definition.system_prompt(), state.instructions());
        let session = provider
            .create_session(SessionConfig {
                model: model.clone(),
                system_prompt,
                toolbox: toolbox.clone(),
                deps_type: definition.deps_type().map(String::from),
                output: definition.output().clone(),
            })
            .map_err(|e| {
                tracing::error!(provider = provider.name(), error = %e, "Failed to open session");
                AgentError::Session(e)
            })?;

        tracing::info!(
            agent = %id,
            agent_type = type_name::<A>(),
            provider = provider.name(),
            model = %model,
            tools = ?toolbox.names(),
            "Agent ready"
        );

        Ok(Agent {
            id,
            state,
            definition,
            history: History::new(),
            user_timezone,
            model,
            request_timeout,
            session,
        })
    }
}
