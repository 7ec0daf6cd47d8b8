//! Tool System
//!
//! Provider-facing side of tools: call/result types, parameter schemas,
//! argument binding and the [`Toolbox`] a session invokes tools through.

use async_trait::async_trait;
use chrono::{FixedOffset, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::BindingError;
use crate::provider::RunContext;

/// Name of the implicit date tool every agent carries
pub const CURRENT_DATE_TOOL: &str = "current_date";

/// Tool call request from the LLM
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Named arguments (object) or positional arguments (array)
    #[serde(default)]
    pub arguments: Value,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Result from tool execution, as handed back to the provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error) as the model sees it
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
        }
    }

    /// Successful result carrying a JSON value; strings are passed through as text
    pub fn from_value(name: impl Into<String>, value: Value) -> Self {
        match value {
            Value::String(text) => Self::success(name, text),
            other => Self::success(name, other.to_string()).with_data(other),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            _ => true,
        }
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions, in declaration order
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON Schema object describing the parameters
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.param_type));
            prop.insert("description".into(), json!(param.description));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), json!(values));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Arguments of one call, keyed by declared parameter name
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BoundArguments(BTreeMap<String, Value>);

impl BoundArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String argument, failing if absent or not a string
    pub fn get_str(&self, name: &str) -> Result<&str, BindingError> {
        match self.0.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(BindingError::TypeMismatch {
                name: name.to_string(),
                expected: "string".into(),
                found: json_type(other).into(),
            }),
            None => Err(BindingError::Missing(name.to_string())),
        }
    }

    /// Deserialize all arguments into a typed struct
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_value())
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for BoundArguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Bind a call's arguments to the schema's parameters.
///
/// Accepts named arguments (object), positional arguments (array, in
/// declaration order) or nothing (null). Absent optional parameters take
/// their default when one is declared.
pub fn bind(schema: &ToolSchema, arguments: &Value) -> Result<BoundArguments, BindingError> {
    let mut given: HashMap<&str, &Value> = HashMap::new();

    match arguments {
        Value::Null => {}
        Value::Object(map) => {
            for (key, value) in map {
                if !schema.parameters.iter().any(|p| &p.name == key) {
                    return Err(BindingError::Unexpected(key.clone()));
                }
                given.insert(key.as_str(), value);
            }
        }
        Value::Array(values) => {
            if values.len() > schema.parameters.len() {
                return Err(BindingError::TooManyPositional {
                    expected: schema.parameters.len(),
                    given: values.len(),
                });
            }
            for (param, value) in schema.parameters.iter().zip(values) {
                given.insert(param.name.as_str(), value);
            }
        }
        other => return Err(BindingError::Shape(json_type(other).into())),
    }

    let mut bound = BTreeMap::new();
    for param in &schema.parameters {
        let value = match given.get(param.name.as_str()) {
            Some(value) => *value,
            None => match &param.default {
                Some(default) => default,
                None if param.required => return Err(BindingError::Missing(param.name.clone())),
                None => continue,
            },
        };

        if !param.accepts(value) {
            return Err(BindingError::TypeMismatch {
                name: param.name.clone(),
                expected: param.param_type.clone(),
                found: json_type(value).into(),
            });
        }
        if let Some(allowed) = &param.enum_values {
            if !allowed.contains(value) {
                return Err(BindingError::NotAllowed {
                    name: param.name.clone(),
                    allowed: Value::Array(allowed.clone()).to_string(),
                    value: value.to_string(),
                });
            }
        }
        bound.insert(param.name.clone(), value.clone());
    }

    Ok(BoundArguments(bound))
}

/// A tool as the provider sees it
#[async_trait]
pub trait ModelTool: Send + Sync {
    /// Schema sent to the model
    fn schema(&self) -> &ToolSchema;

    /// Run one call. Never fails: failures come back as a failed `ToolResult`.
    async fn invoke(&self, call: &ToolCall, ctx: &RunContext) -> ToolResult;
}

/// Tools bound to one agent instance, in registration order
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: Vec<Arc<dyn ModelTool>>,
    index: HashMap<String, usize>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a later tool with the same name replaces the earlier one
    pub fn register(&mut self, tool: Arc<dyn ModelTool>) {
        let name = tool.schema().name.clone();
        match self.index.get(&name) {
            Some(&idx) => self.tools[idx] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelTool>> {
        self.index.get(name).map(|&idx| Arc::clone(&self.tools[idx]))
    }

    /// Execute a tool call
    pub async fn invoke(&self, call: &ToolCall, ctx: &RunContext) -> ToolResult {
        match self.get(&call.name) {
            Some(tool) => tool.invoke(call, ctx).await,
            None => {
                tracing::warn!(tool = %call.name, "Model called an unknown tool");
                ToolResult::failure(&call.name, format!("Tool not found: {}", call.name))
                    .with_id(call.id.clone())
            }
        }
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<&ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.schema().name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Current date and time in the user's UTC offset, ISO-8601
pub fn current_date(offset: FixedOffset) -> String {
    Utc::now()
        .with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Implicit date tool. Not wrapped: no progress report, no label.
pub struct CurrentDateTool {
    offset: FixedOffset,
    schema: ToolSchema,
}

impl CurrentDateTool {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            schema: ToolSchema::new(
                CURRENT_DATE_TOOL,
                "Get the current date and time in the user's timezone, in ISO-8601 format.",
            ),
        }
    }
}

#[async_trait]
impl ModelTool for CurrentDateTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, call: &ToolCall, _ctx: &RunContext) -> ToolResult {
        ToolResult::success(CURRENT_DATE_TOOL, current_date(self.offset)).with_id(call.id.clone())
    }
}
