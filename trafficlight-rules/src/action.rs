use serde_json::Value;

/// Catalog of side-effect actions that may follow a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlsoActionKind {
    /// Write the props to the tracing sink.
    Log,
    /// Issue an outbound HTTP request described by the props.
    HttpCall,
    /// Unrecognised name; running it is a no-op.
    Unknown(String),
}

impl AlsoActionKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "log" => AlsoActionKind::Log,
            "axios" | "httpCall" => AlsoActionKind::HttpCall,
            other => AlsoActionKind::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AlsoActionKind::Log => "log",
            AlsoActionKind::HttpCall => "httpCall",
            AlsoActionKind::Unknown(name) => name,
        }
    }
}

/// One `also` entry of an output descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AlsoInvocation {
    /// Name as written in the definition; may be empty.
    pub name: String,
    pub props: Value,
}

impl AlsoInvocation {
    pub fn new(name: impl Into<String>, props: Value) -> Self {
        Self {
            name: name.into(),
            props,
        }
    }

    pub fn kind(&self) -> AlsoActionKind {
        AlsoActionKind::parse(&self.name)
    }
}
