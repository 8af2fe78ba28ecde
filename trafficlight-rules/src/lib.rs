//! Rule evaluation engine for the TrafficLight content router.
//!
//! A rule definition ("router") is a YAML document holding a condition made of
//! predicate tools plus a `then` and an optional `else` output descriptor. This
//! crate parses definitions into typed values with strict validation, runs the
//! predicate tools against a request and picks the branch to render. Rendering
//! itself lives in the gateway.

mod action;
mod engine;
mod error;
mod geo;
mod loader;
mod outcome;
mod rule;
mod schema;
mod store;
mod template;
mod tools;

pub use action::{AlsoActionKind, AlsoInvocation};
pub use engine::RuleEvaluator;
pub use error::{GeoError, RuleError, TemplateError, ToolError};
pub use geo::{GeoLocator, NullGeoLocator, StaticGeoLocator};
pub use loader::{validate_router_name, FileSystemRuleSource, RuleSource};
pub use outcome::{aggregate, Decision, ToolReport};
pub use rule::{Condition, OutputData, OutputDescriptor, OutputKind, RuleDefinition, ToolInvocation};
pub use schema::{ValidationReport, Violation};
pub use store::{RuleHistoryEntry, RuleStore};
pub use template::{
    action_mask, camel_case, mask_object, render_raw, standard_mask, substitute, Mask,
    HEADERS_PLACEHOLDER, MASK_SIGIL, REQUEST_PLACEHOLDER,
};
pub use tools::{PredicateRegistry, ToolKind, ToolOutcome};
pub use trafficlight_protocol::analytics::RouterMeta;
