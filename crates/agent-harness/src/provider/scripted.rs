//! Scripted Provider
//!
//! Deterministic provider for tests and demos. Each queued round lists the
//! tool calls the "model" makes and the output (or failure) it ends with.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use super::{ModelProvider, ModelSession, OutputSpec, RunRequest, RunResponse, SessionConfig};
use crate::error::ProviderError;
use crate::message::{Message, MessageMetadata, Role};
use crate::tool::{ToolCall, ToolResult, Toolbox};

/// One scripted dispatch round
#[derive(Clone, Debug)]
pub struct ScriptedRound {
    tool_calls: Vec<ToolCall>,
    concurrent: bool,
    delay: Option<Duration>,
    outcome: Result<Value, String>,
}

impl ScriptedRound {
    /// Round that ends with this output
    pub fn reply(output: impl Into<Value>) -> Self {
        Self {
            tool_calls: Vec::new(),
            concurrent: false,
            delay: None,
            outcome: Ok(output.into()),
        }
    }

    /// Round that fails at the provider level
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            outcome: Err(error.into()),
            ..Self::reply(Value::Null)
        }
    }

    /// Call a tool before producing the outcome
    pub fn tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Run this round's tool calls concurrently instead of one after another
    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    /// Sleep before answering
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// What a session was opened with
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub model: String,
    pub system_prompt: String,
    pub tool_names: Vec<String>,
    pub deps_type: Option<String>,
    pub output: OutputSpec,
}

/// What one round received and what its tools returned
#[derive(Clone, Debug)]
pub struct RunRecord {
    pub prompt: String,
    pub history: Vec<Message>,
    pub output: Option<OutputSpec>,
    pub had_deps: bool,
    pub tool_results: Vec<ToolResult>,
}

#[derive(Default)]
struct Shared {
    rounds: tokio::sync::Mutex<VecDeque<ScriptedRound>>,
    sessions: Mutex<Vec<SessionRecord>>,
    runs: Mutex<Vec<RunRecord>>,
}

/// Provider that replays queued rounds. All sessions share one queue.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    shared: Arc<Shared>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rounds(rounds: impl IntoIterator<Item = ScriptedRound>) -> Self {
        Self {
            shared: Arc::new(Shared {
                rounds: tokio::sync::Mutex::new(rounds.into_iter().collect()),
                ..Shared::default()
            }),
        }
    }

    /// Queue another round
    pub async fn push(&self, round: ScriptedRound) {
        self.shared.rounds.lock().await.push_back(round);
    }

    /// Sessions opened so far
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rounds run so far, including failed ones
    pub fn runs(&self) -> Vec<RunRecord> {
        self.shared
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_session(&self, config: SessionConfig) -> Result<Box<dyn ModelSession>, ProviderError> {
        self.shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SessionRecord {
                model: config.model.clone(),
                system_prompt: config.system_prompt.clone(),
                tool_names: config.toolbox.names().into_iter().map(String::from).collect(),
                deps_type: config.deps_type.clone(),
                output: config.output.clone(),
            });

        Ok(Box::new(ScriptedSession {
            shared: Arc::clone(&self.shared),
            model: config.model,
            toolbox: config.toolbox,
        }))
    }
}

struct ScriptedSession {
    shared: Arc<Shared>,
    model: String,
    toolbox: Toolbox,
}

#[async_trait]
impl ModelSession for ScriptedSession {
    async fn run(&self, request: RunRequest<'_>) -> Result<RunResponse, ProviderError> {
        let round = self
            .shared
            .rounds
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ProviderError::Other("script exhausted".into()))?;

        if let Some(delay) = round.delay {
            tokio::time::sleep(delay).await;
        }

        let mut new_messages = vec![Message::user(request.prompt)];
        for call in &round.tool_calls {
            let mut msg = Message::new(Role::Assistant, serde_json::to_string(call)?);
            msg.metadata = Some(MessageMetadata {
                tool_call_id: call.id.clone(),
                tool_name: Some(call.name.clone()),
                model: Some(self.model.clone()),
                ..Default::default()
            });
            new_messages.push(msg);
        }

        let tool_results = if round.concurrent {
            join_all(
                round
                    .tool_calls
                    .iter()
                    .map(|call| self.toolbox.invoke(call, &request.context)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(round.tool_calls.len());
            for call in &round.tool_calls {
                results.push(self.toolbox.invoke(call, &request.context).await);
            }
            results
        };

        for result in &tool_results {
            new_messages.push(Message::tool(&result.output, &result.name, result.id.clone()));
        }

        self.shared
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RunRecord {
                prompt: request.prompt.to_string(),
                history: request.history.to_vec(),
                output: request.output.clone(),
                had_deps: request.context.has_deps(),
                tool_results,
            });

        let output = round.outcome.map_err(ProviderError::Provider)?;
        let text = match &output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        new_messages.push(Message::assistant(text).with_model(&self.model));

        Ok(RunResponse {
            output,
            new_messages,
        })
    }
}
