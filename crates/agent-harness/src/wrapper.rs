//! Tool Wrapper
//!
//! Binds a declared capability to one agent instance and makes every call
//! go through the same steps: bind arguments, resolve the label, report it,
//! run the capability, isolate its failure.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use crate::agent::AgentId;
use crate::error::{DisplayNameError, ToolFailure};
use crate::provider::RunContext;
use crate::registry::{AgentType, Capability, ToolInvocation};
use crate::report::ProgressReporter;
use crate::tool::{ModelTool, ToolCall, ToolResult, ToolSchema, bind};

/// A capability bound to an agent instance and its reporter
pub struct BoundTool<A: AgentType> {
    capability: Arc<Capability<A>>,
    agent: Arc<A>,
    reporter: Arc<dyn ProgressReporter>,
    agent_id: AgentId,
}

impl<A: AgentType> BoundTool<A> {
    pub fn new(
        capability: Arc<Capability<A>>,
        agent: Arc<A>,
        reporter: Arc<dyn ProgressReporter>,
        agent_id: AgentId,
    ) -> Self {
        Self {
            capability,
            agent,
            reporter,
            agent_id,
        }
    }

    /// Run one call through bind → label → report → execute.
    ///
    /// Failures come back typed; [`ModelTool::invoke`] turns them into the
    /// text the model sees.
    pub async fn call(&self, call: &ToolCall, ctx: &RunContext) -> Result<Value, ToolFailure> {
        let tool = self.capability.name();
        let _trace = CompletionTrace {
            agent: &self.agent_id,
            tool,
        };
        tracing::debug!(agent = %self.agent_id, tool, "Using tool");

        let args = bind(self.capability.schema(), &call.arguments).map_err(|source| {
            tracing::warn!(
                agent = %self.agent_id,
                tool,
                arguments = %call.arguments,
                error = %source,
                "Tool call does not match its parameters"
            );
            ToolFailure::Binding {
                tool: tool.to_string(),
                source,
            }
        })?;

        let display_name = catch_unwind(AssertUnwindSafe(|| {
            self.capability.display_name().resolve(&args)
        }))
        .unwrap_or_else(|panic| Err(DisplayNameError::Failed(panic_message(panic.as_ref()))))
        .map_err(|source| {
            tracing::error!(
                agent = %self.agent_id,
                tool,
                arguments = %args.to_value(),
                error = %source,
                "Error resolving tool display name"
            );
            ToolFailure::DisplayName {
                tool: tool.to_string(),
                source,
            }
        })?;

        self.reporter.report(&display_name).await;

        let invocation = ToolInvocation {
            args,
            deps: ctx.deps::<A::Deps>(),
            display_name,
            call_id: call.id.clone(),
        };
        let run = self.capability.run(Arc::clone(&self.agent), invocation);

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::error!(agent = %self.agent_id, tool, error = ?err, "Error in tool");
                Err(ToolFailure::Execution {
                    tool: tool.to_string(),
                    message: format!("{err:#}"),
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(agent = %self.agent_id, tool, %message, "Tool panicked");
                Err(ToolFailure::Execution {
                    tool: tool.to_string(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl<A: AgentType> ModelTool for BoundTool<A> {
    fn schema(&self) -> &ToolSchema {
        self.capability.schema()
    }

    async fn invoke(&self, call: &ToolCall, ctx: &RunContext) -> ToolResult {
        let name = self.capability.name();
        let result = match self.call(call, ctx).await {
            Ok(value) => ToolResult::from_value(name, value),
            Err(failure) => ToolResult::failure(name, failure.to_string()),
        };
        result.with_id(call.id.clone())
    }
}

/// Logs the end of a tool call on every exit path, cancellation included
struct CompletionTrace<'a> {
    agent: &'a AgentId,
    tool: &'a str,
}

impl Drop for CompletionTrace<'_> {
    fn drop(&mut self) {
        tracing::debug!(agent = %self.agent, tool = self.tool, "Done using tool");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "tool panicked".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayName;
    use crate::error::BindingError;
    use crate::registry::{ToolSetBuilder, definition};
    use crate::report::NoopReporter;
    use crate::tool::ParameterSchema;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Notes {
        reads: Mutex<Vec<String>>,
    }

    struct Project {
        name: String,
    }

    impl AgentType for Notes {
        type Deps = Project;
        type Output = String;

        const SYSTEM_PROMPT: &'static str = "You keep notes.";

        fn register_tools(tools: &mut ToolSetBuilder<Self>) {
            tools
                .tool(
                    ToolSchema::new("read_note", "Read a note")
                        .param(ParameterSchema::required("file_path", "string", "Note path")),
                    "Reading file {file_path}",
                    |agent: Arc<Notes>, call| async move {
                        let path = call.args.get_str("file_path")?.to_string();
                        agent.reads.lock().unwrap().push(path.clone());
                        anyhow::Ok(format!("contents of {path}"))
                    },
                )
                .tool(
                    ToolSchema::new("broken", "Always fails"),
                    "Breaking",
                    |_agent, _call| async { Err::<(), _>(anyhow::anyhow!("disk on fire")) },
                )
                .tool(
                    ToolSchema::new("mislabeled", "Label needs a missing argument")
                        .param(ParameterSchema::optional("topic", "string", "Topic")),
                    "Searching {topic}",
                    |_agent, _call| async { Ok("unreachable") },
                )
                .tool(
                    ToolSchema::new("project_name", "Name of the current project"),
                    "Checking project",
                    |_agent, call| async move {
                        Ok(call.deps.map(|p| p.name.clone()).unwrap_or_default())
                    },
                )
                .tool(
                    ToolSchema::new("peek", "Peek at a nested note")
                        .param(ParameterSchema::required("file_path", "string", "Note path")),
                    DisplayName::computed(|args| {
                        let parts: Vec<_> = args.get_str("file_path")?.split('/').collect();
                        Ok(format!("Peeking at {}", parts[1]))
                    }),
                    |_agent, _call| async { Ok("peeked") },
                )
                .tool(
                    ToolSchema::new("panicky", "Panics"),
                    "Panicking",
                    |_agent, _call| async {
                        if true {
                            panic!("index out of bounds");
                        }
                        Ok(())
                    },
                );
        }
    }

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl ProgressReporter for Recorder {
        async fn report(&self, display_name: &str) {
            self.0.lock().unwrap().push(display_name.to_string());
        }
    }

    fn bound(name: &str, agent: Arc<Notes>, reporter: Arc<dyn ProgressReporter>) -> BoundTool<Notes> {
        let capability = Arc::clone(definition::<Notes>().tools().get(name).unwrap());
        BoundTool::new(capability, agent, reporter, AgentId::new())
    }

    #[tokio::test]
    async fn test_reports_label_from_bound_arguments_then_runs() {
        let agent = Arc::new(Notes::default());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let tool = bound("read_note", Arc::clone(&agent), recorder.clone());

        let call = ToolCall::new("read_note", json!({"file_path": "a.txt"}));
        let value = tool.call(&call, &RunContext::default()).await.unwrap();

        assert_eq!(value, json!("contents of a.txt"));
        assert_eq!(*recorder.0.lock().unwrap(), ["Reading file a.txt"]);
        assert_eq!(*agent.reads.lock().unwrap(), ["a.txt"]);
    }

    #[tokio::test]
    async fn test_positional_arguments_bind_by_name() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let tool = bound("read_note", Arc::new(Notes::default()), recorder.clone());

        let call = ToolCall::new("read_note", json!(["docs/b.md"]));
        tool.call(&call, &RunContext::default()).await.unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), ["Reading file docs/b.md"]);
    }

    #[tokio::test]
    async fn test_execution_failure_is_isolated() {
        let tool = bound("broken", Arc::new(Notes::default()), Arc::new(NoopReporter));
        let call = ToolCall::new("broken", Value::Null).with_id("call-7");

        let failure = tool.call(&call, &RunContext::default()).await.unwrap_err();
        assert_eq!(
            failure,
            ToolFailure::Execution {
                tool: "broken".into(),
                message: "disk on fire".into(),
            }
        );

        let result = tool.invoke(&call, &RunContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.output, "Error in tool broken: disk on fire");
        assert_eq!(result.id.as_deref(), Some("call-7"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let tool = bound("panicky", Arc::new(Notes::default()), Arc::new(NoopReporter));
        let result = tool
            .invoke(&ToolCall::new("panicky", Value::Null), &RunContext::default())
            .await;
        assert!(!result.success);
        assert!(result.output.contains("panicky"));
        assert!(result.output.contains("index out of bounds"));
    }

    struct SlowReporter(Arc<Notes>);

    #[async_trait]
    impl ProgressReporter for SlowReporter {
        async fn report(&self, display_name: &str) {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.reads.lock().unwrap().push(format!("report:{display_name}"));
        }
    }

    #[tokio::test]
    async fn test_report_completes_before_capability_runs() {
        let agent = Arc::new(Notes::default());
        let tool = bound(
            "read_note",
            Arc::clone(&agent),
            Arc::new(SlowReporter(Arc::clone(&agent))),
        );

        let call = ToolCall::new("read_note", json!({"file_path": "a.txt"}));
        tool.call(&call, &RunContext::default()).await.unwrap();
        assert_eq!(*agent.reads.lock().unwrap(), ["report:Reading file a.txt", "a.txt"]);
    }

    #[tokio::test]
    async fn test_panicking_label_is_isolated() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let tool = bound("peek", Arc::new(Notes::default()), recorder.clone());
        let call = ToolCall::new("peek", json!({"file_path": "README.md"}));

        let failure = tool.call(&call, &RunContext::default()).await.unwrap_err();
        assert!(matches!(
            failure,
            ToolFailure::DisplayName { source: DisplayNameError::Failed(ref msg), .. }
                if msg.contains("index out of bounds")
        ));
        assert!(recorder.0.lock().unwrap().is_empty());

        let result = tool.invoke(&call, &RunContext::default()).await;
        assert!(!result.success);
        assert!(result.output.starts_with("Error: "));

        let nested = ToolCall::new("peek", json!({"file_path": "notes/b.md"}));
        assert_eq!(
            tool.call(&nested, &RunContext::default()).await.unwrap(),
            json!("peeked")
        );
        assert_eq!(*recorder.0.lock().unwrap(), ["Peeking at b.md"]);
    }

    #[tokio::test]
    async fn test_label_failure_skips_report_and_execution() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let tool = bound("mislabeled", Arc::new(Notes::default()), recorder.clone());

        let failure = tool
            .call(&ToolCall::new("mislabeled", json!({})), &RunContext::default())
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            ToolFailure::DisplayName {
                tool: "mislabeled".into(),
                source: DisplayNameError::MissingArgument("topic".into()),
            }
        );
        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(
            failure.to_string(),
            "Error: display name references missing argument 'topic'"
        );
    }

    #[tokio::test]
    async fn test_binding_failure_is_typed() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let tool = bound("read_note", Arc::new(Notes::default()), recorder.clone());

        let failure = tool
            .call(&ToolCall::new("read_note", json!({"path": "a.txt"})), &RunContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            failure,
            ToolFailure::Binding { source: BindingError::Unexpected(ref name), .. } if name == "path"
        ));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deps_reach_the_capability() {
        let tool = bound("project_name", Arc::new(Notes::default()), Arc::new(NoopReporter));
        let ctx = RunContext::with_deps(Some(Project {
            name: "atlas".into(),
        }));
        let value = tool
            .call(&ToolCall::new("project_name", Value::Null), &ctx)
            .await
            .unwrap();
        assert_eq!(value, json!("atlas"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let agent = Arc::new(Notes::default());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let tool = bound("read_note", Arc::clone(&agent), recorder.clone());
        let ctx = RunContext::default();

        let calls: Vec<_> = (0..5)
            .map(|i| ToolCall::new("read_note", json!({"file_path": format!("{i}.txt")})))
            .collect();
        let results = futures::future::join_all(calls.iter().map(|c| tool.call(c, &ctx))).await;

        assert!(results.iter().all(Result::is_ok));
        let mut reported = recorder.0.lock().unwrap().clone();
        reported.sort();
        assert_eq!(
            reported,
            (0..5).map(|i| format!("Reading file {i}.txt")).collect::<Vec<_>>()
        );
        assert_eq!(agent.reads.lock().unwrap().len(), 5);
    }
}
