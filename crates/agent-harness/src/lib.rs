//! # agent-harness
//!
//! Conversational agents built from typed tool declarations, with a
//! provider-agnostic model abstraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Agent<A>                                │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │    Prompt    │  │    Tool      │  │  ModelProvider         │  │
//! │  │  Dispatcher  │──│   Registry   │──│  (Strategy)            │  │
//! │  └──────┬───────┘  └──────┬───────┘  └────────────────────────┘  │
//! │         │                 │                                      │
//! │  ┌──────┴───────┐  ┌──────┴───────┐  ┌────────────────────────┐  │
//! │  │   History    │  │ Tool Wrapper │──│  ProgressReporter      │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An [`AgentType`] declares its system prompt and capabilities once; every
//! [`Agent`] of that type gets its own history and provider session, and
//! every capability call is reported by its display name before it runs.

pub mod agent;
pub mod config;
pub mod display;
pub mod error;
pub mod message;
pub mod provider;
pub mod registry;
pub mod report;
pub mod tool;
pub mod wrapper;

pub use agent::{Agent, AgentBuilder, AgentId, UserTimezone};
pub use config::HarnessConfig;
pub use display::DisplayName;
pub use error::{AgentError, BindingError, DisplayNameError, ProviderError, Result, ToolFailure};
pub use message::{History, Message, Role};
pub use provider::{AgentOutput, ModelProvider, ModelSession, OutputSpec, RunContext};
pub use registry::{AgentDefinition, AgentType, ToolInvocation, ToolSetBuilder, definition};
pub use report::{NoopReporter, ProgressReporter, reporter_fn};
pub use tool::{BoundArguments, ModelTool, ParameterSchema, ToolCall, ToolResult, ToolSchema};
