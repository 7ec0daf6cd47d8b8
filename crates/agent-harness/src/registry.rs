//! Tool Registry
//!
//! Each agent type declares its capabilities once, in
//! [`AgentType::register_tools`]. The resulting [`AgentDefinition`] is built
//! on first use and shared by every instance of the type.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, OnceLock, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::display::DisplayName;
use crate::provider::{AgentOutput, OutputSpec};
use crate::tool::{BoundArguments, CURRENT_DATE_TOOL, ToolSchema};

/// Names owned by the harness itself; a capability can never take them
pub const RESERVED_TOOL_NAMES: &[&str] = &[
    CURRENT_DATE_TOOL,
    "send_prompt",
    "send_prompt_with",
    "send_prompt_as",
    "history",
];

/// A concrete kind of agent: its prompt, its capabilities and its types
pub trait AgentType: Sized + Send + Sync + 'static {
    /// Dependencies a round may carry to the tools; `()` for none
    type Deps: Send + Sync + 'static;

    /// Default output of a round
    type Output: AgentOutput;

    /// Instructions for the model, shared by every instance
    const SYSTEM_PROMPT: &'static str;

    /// Declare the capabilities the model may call
    fn register_tools(tools: &mut ToolSetBuilder<Self>);

    /// Extra instructions for this instance, appended to the system prompt
    fn instructions(&self) -> Option<String> {
        None
    }
}

/// What a capability receives for one call
#[derive(Debug)]
pub struct ToolInvocation<D> {
    /// Arguments bound to the declared parameters
    pub args: BoundArguments,

    /// Dependencies of the current round
    pub deps: Option<Arc<D>>,

    /// Label that was reported for this call
    pub display_name: String,

    /// Provider's call ID
    pub call_id: Option<String>,
}

type Handler<A> = dyn Fn(Arc<A>, ToolInvocation<<A as AgentType>::Deps>) -> BoxFuture<'static, anyhow::Result<Value>>
    + Send
    + Sync;

/// One declared capability of an agent type
pub struct Capability<A: AgentType> {
    schema: ToolSchema,
    display_name: DisplayName,
    handler: Arc<Handler<A>>,
}

impl<A: AgentType> Capability<A> {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }

    pub(crate) fn run(
        &self,
        agent: Arc<A>,
        invocation: ToolInvocation<A::Deps>,
    ) -> BoxFuture<'static, anyhow::Result<Value>> {
        (self.handler)(agent, invocation)
    }
}

impl<A: AgentType> std::fmt::Debug for Capability<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.schema.name)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Collects capability declarations for one agent type
pub struct ToolSetBuilder<A: AgentType> {
    declared: Vec<Capability<A>>,
}

impl<A: AgentType> ToolSetBuilder<A> {
    fn new() -> Self {
        Self {
            declared: Vec::new(),
        }
    }

    /// Declare a capability.
    ///
    /// The handler gets the agent instance and the bound call; whatever it
    /// returns is serialized to JSON for the model.
    pub fn tool<F, Fut, R>(
        &mut self,
        schema: ToolSchema,
        display_name: impl Into<DisplayName>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(Arc<A>, ToolInvocation<A::Deps>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let handler: Arc<Handler<A>> =
            Arc::new(move |agent: Arc<A>, invocation: ToolInvocation<A::Deps>| {
                let fut = handler(agent, invocation);
                async move {
                    let output = fut.await?;
                    serde_json::to_value(output).map_err(anyhow::Error::from)
                }
                .boxed()
            });
        self.declared.push(Capability {
            schema,
            display_name: display_name.into(),
            handler,
        });
        self
    }

    fn build(self) -> ToolSet<A> {
        let mut names = BTreeSet::new();
        let mut capabilities = Vec::new();

        for capability in self.declared {
            let name = capability.name().to_string();
            if name.starts_with('_') {
                tracing::debug!(tool = %name, "Skipping private capability");
            } else if RESERVED_TOOL_NAMES.contains(&name.as_str()) {
                tracing::warn!(tool = %name, "Capability name is reserved by the harness, skipping");
            } else if let Err(err) = capability.display_name().validate(capability.schema()) {
                tracing::warn!(tool = %name, error = %err, "Capability display name is invalid, skipping");
            } else if !names.insert(name.clone()) {
                tracing::warn!(tool = %name, "Capability declared twice, keeping the first");
            } else {
                capabilities.push(Arc::new(capability));
            }
        }

        ToolSet {
            capabilities,
            names,
        }
    }
}

/// Immutable capability set of one agent type
pub struct ToolSet<A: AgentType> {
    capabilities: Vec<Arc<Capability<A>>>,
    names: BTreeSet<String>,
}

impl<A: AgentType> ToolSet<A> {
    /// Capabilities in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Capability<A>>> {
        self.capabilities.iter()
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Capability<A>>> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Everything resolved once per agent type
pub struct AgentDefinition<A: AgentType> {
    system_prompt: &'static str,
    tools: ToolSet<A>,
    deps_type: Option<String>,
    output: OutputSpec,
}

impl<A: AgentType> AgentDefinition<A> {
    fn resolve() -> Self {
        let mut builder = ToolSetBuilder::new();
        A::register_tools(&mut builder);
        let tools = builder.build();

        let deps_type = (TypeId::of::<A::Deps>() != TypeId::of::<()>())
            .then(|| std::any::type_name::<A::Deps>().to_string());

        tracing::debug!(
            agent_type = std::any::type_name::<A>(),
            tools = ?tools.names(),
            "Resolved agent definition"
        );

        Self {
            system_prompt: A::SYSTEM_PROMPT,
            tools,
            deps_type,
            output: A::Output::output_spec(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
    }

    pub fn tools(&self) -> &ToolSet<A> {
        &self.tools
    }

    /// Names of the type's tools, excluding the harness's own
    pub fn tool_names(&self) -> &BTreeSet<String> {
        self.tools.names()
    }

    pub fn deps_type(&self) -> Option<&str> {
        self.deps_type.as_deref()
    }

    pub fn output(&self) -> &OutputSpec {
        &self.output
    }
}

type Slot = Arc<OnceLock<Arc<dyn Any + Send + Sync>>>;

static DEFINITIONS: LazyLock<Mutex<HashMap<TypeId, Slot>>> = LazyLock::new(Mutex::default);

/// The definition of `A`, built on first call and shared afterwards
pub fn definition<A: AgentType>() -> Arc<AgentDefinition<A>> {
    let slot = {
        let mut slots = DEFINITIONS.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(TypeId::of::<A>()).or_default())
    };

    let erased = slot.get_or_init(|| {
        Arc::new(AgentDefinition::<A>::resolve()) as Arc<dyn Any + Send + Sync>
    });
    Arc::clone(erased)
        .downcast::<AgentDefinition<A>>()
        .unwrap_or_else(|_| unreachable!("definition slots are keyed by TypeId"))
}
