use std::fmt;

use serde_json::Value;
use trafficlight_protocol::analytics::RouterMeta;

use crate::action::AlsoInvocation;
use crate::tools::ToolKind;

/// Typed, validated rule definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    /// Router name the definition was loaded under.
    pub name: String,
    pub meta: Option<RouterMeta>,
    pub condition: Condition,
    pub then_branch: OutputDescriptor,
    /// Empty descriptor when the document has no `else`.
    pub else_branch: OutputDescriptor,
}

impl RuleDefinition {
    pub fn tools(&self) -> &[ToolInvocation] {
        match &self.condition {
            Condition::Literal(_) => &[],
            Condition::Tools(tools) => tools,
        }
    }

    pub fn is_noindex(&self) -> bool {
        self.meta.as_ref().map(|meta| meta.noindex).unwrap_or(false)
    }
}

/// The `if` section of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Constant predicate returning the literal for every request.
    Literal(bool),
    /// Tools combined with AND, where undecided counts as failure.
    Tools(Vec<ToolInvocation>),
}

/// One `{toolName: args}` entry of a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub kind: ToolKind,
    pub args: Value,
}

impl ToolInvocation {
    pub fn new(name: &str, args: Value) -> Self {
        Self {
            kind: ToolKind::parse(name),
            args,
        }
    }
}

/// Renderer selected by an output descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Json,
    Html,
    Redirect,
    ProxyPass,
}

impl OutputKind {
    /// Case-insensitive parse of the `type` field.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "JSON" => Some(OutputKind::Json),
            "HTML" => Some(OutputKind::Html),
            "REDIRECT" => Some(OutputKind::Redirect),
            "PROXYPASS" => Some(OutputKind::ProxyPass),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Json => "JSON",
            OutputKind::Html => "HTML",
            OutputKind::Redirect => "REDIRECT",
            OutputKind::ProxyPass => "PROXYPASS",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `data` section of an output descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputData {
    pub file: Option<String>,
    pub raw: Option<Value>,
}

/// How to render a branch, plus its side effects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDescriptor {
    /// `None` means "matched but nothing to render".
    pub kind: Option<OutputKind>,
    pub data: OutputData,
    pub also: Vec<AlsoInvocation>,
}

impl OutputDescriptor {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
    }
}
