//! TrafficLight: a dynamic HTTP content router.
//!
//! Requests to `/{group}/{router}` are answered by evaluating the router's
//! rule definition against the request and rendering the selected branch.
//!
//! * `core`: configuration, errors, tracing and database primitives
//! * `protocol`: request context, analytics record and envelope types
//! * `rules`: rule schema, predicate tools, templating and the evaluator
//! * `gateway`: the axum service that dispatches outputs and records traffic

pub use trafficlight_core as core;
pub use trafficlight_gateway as gateway;
pub use trafficlight_protocol as protocol;
pub use trafficlight_rules as rules;

pub use trafficlight_gateway::{start_gateway, GatewayHandle};
pub use trafficlight_rules::{Decision, RuleDefinition, RuleEvaluator, RuleSource};
