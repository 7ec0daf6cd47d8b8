//! Display Names
//!
//! Human-readable progress labels for tool calls. A label is resolved from
//! the call's bound arguments right before the tool runs, so the reported
//! text describes the exact call about to execute.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::DisplayNameError;
use crate::tool::{BoundArguments, ToolSchema};

type LabelFn = dyn Fn(&BoundArguments) -> anyhow::Result<String> + Send + Sync;

/// How a tool's progress label is produced
#[derive(Clone)]
pub enum DisplayName {
    /// Literal label, used as is
    Fixed(String),

    /// `{name}` placeholders filled from the bound arguments
    Templated(Template),

    /// Arbitrary function of the bound arguments
    Computed(Arc<LabelFn>),
}

impl DisplayName {
    pub fn fixed(label: impl Into<String>) -> Self {
        Self::Fixed(label.into())
    }

    pub fn template(template: impl Into<String>) -> Self {
        Self::Templated(Template::parse(template))
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&BoundArguments) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// Parameter names this label needs (empty for fixed and computed labels)
    pub fn requires(&self) -> BTreeSet<String> {
        match self {
            Self::Templated(template) => template.requires(),
            Self::Fixed(_) | Self::Computed(_) => BTreeSet::new(),
        }
    }

    /// Check that a template parses and names only declared parameters
    pub fn validate(&self, schema: &ToolSchema) -> Result<(), DisplayNameError> {
        if let Self::Templated(Template {
            segments: Err(err), ..
        }) = self
        {
            return Err(err.clone());
        }
        match self
            .requires()
            .into_iter()
            .find(|name| !schema.parameters.iter().any(|p| &p.name == name))
        {
            Some(name) => Err(DisplayNameError::MissingArgument(name)),
            None => Ok(()),
        }
    }

    /// Produce the label for one call
    pub fn resolve(&self, args: &BoundArguments) -> Result<String, DisplayNameError> {
        match self {
            Self::Fixed(label) => Ok(label.clone()),
            Self::Templated(template) => template.render(args),
            Self::Computed(f) => f(args).map_err(|e| DisplayNameError::Failed(format!("{e:#}"))),
        }
    }
}

/// String labels are templates; one without placeholders renders verbatim.
impl From<&str> for DisplayName {
    fn from(template: &str) -> Self {
        Self::template(template)
    }
}

impl From<String> for DisplayName {
    fn from(template: String) -> Self {
        Self::template(template)
    }
}

impl fmt::Debug for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(label) => f.debug_tuple("Fixed").field(label).finish(),
            Self::Templated(template) => f.debug_tuple("Templated").field(&template.source).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Parsed `{name}` template. `{{` and `}}` escape literal braces.
#[derive(Clone, Debug)]
pub struct Template {
    source: String,
    segments: Result<Vec<Segment>, DisplayNameError>,
}

impl Template {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = parse_segments(&source);
        Self { source, segments }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn requires(&self) -> BTreeSet<String> {
        match &self.segments {
            Ok(segments) => segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Field(name) => Some(name.clone()),
                    Segment::Literal(_) => None,
                })
                .collect(),
            Err(_) => BTreeSet::new(),
        }
    }

    pub fn render(&self, args: &BoundArguments) -> Result<String, DisplayNameError> {
        let segments = self.segments.as_ref().map_err(Clone::clone)?;
        let mut out = String::with_capacity(self.source.len());
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = args
                        .get(name)
                        .ok_or_else(|| DisplayNameError::MissingArgument(name.clone()))?;
                    push_value(&mut out, value);
                }
            }
        }
        Ok(out)
    }
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}

fn parse_segments(source: &str) -> Result<Vec<Segment>, DisplayNameError> {
    let malformed = |position| DisplayNameError::Malformed {
        template: source.to_string(),
        position,
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((j, '{')) => return Err(malformed(j)),
                        Some((_, ch)) => name.push(ch),
                        None => return Err(malformed(i)),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(malformed(i));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name.to_string()));
            }
            '}' => return Err(malformed(i)),
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
