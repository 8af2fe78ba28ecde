use std::path::PathBuf;

use thiserror::Error;

use crate::schema::ValidationReport;

/// Errors returned when loading or resolving rule definitions.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rules path does not exist: {0}")]
    MissingPath(String),
    #[error("failed to read rules from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule definition from {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid router name: {0}")]
    InvalidName(String),
    #[error("rule definition not found: {0}")]
    NotFound(String),
    #[error("rule definition {name} is invalid: {report}")]
    Invalid {
        name: String,
        report: ValidationReport,
    },
}

impl RuleError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuleError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RuleError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    /// Whether the error describes a broken definition rather than a missing one.
    pub fn is_definition_error(&self) -> bool {
        matches!(self, RuleError::Invalid { .. } | RuleError::Parse { .. })
    }
}

/// Errors raised by the template substitution engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("mask key {0:?} must start with '$'")]
    InvalidMaskKey(String),
}

/// Failures inside a predicate. They never reach the client; the tool is
/// reported as undecided instead.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("client ip {0:?} is not a valid address")]
    InvalidIp(String),
    #[error(transparent)]
    Geo(#[from] GeoError),
}

/// Errors produced by geolocation backends.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation database unavailable: {0}")]
    Unavailable(String),
    #[error("geolocation lookup failed: {0}")]
    Lookup(String),
}
