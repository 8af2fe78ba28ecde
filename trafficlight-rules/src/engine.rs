use futures::future::join_all;
use tracing::{debug, warn};
use trafficlight_protocol::request::RequestContext;

use crate::outcome::{aggregate, Decision, ToolReport};
use crate::rule::{Condition, RuleDefinition, ToolInvocation};
use crate::template::{mask_object, standard_mask, Mask};
use crate::tools::{PredicateRegistry, ToolOutcome};

/// Runs a rule's condition and selects the branch to render.
#[derive(Clone)]
pub struct RuleEvaluator {
    registry: PredicateRegistry,
}

impl RuleEvaluator {
    pub fn new(registry: PredicateRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    /// Evaluates every tool (no short-circuit) and picks `then` or `else`.
    pub async fn evaluate(&self, rule: &RuleDefinition, ctx: &RequestContext) -> Decision {
        let tool_results = match &rule.condition {
            Condition::Literal(_) => Vec::new(),
            Condition::Tools(tools) => {
                let mask = standard_mask(ctx);
                join_all(
                    tools
                        .iter()
                        .map(|tool| self.run_tool(&rule.name, tool, &mask, ctx)),
                )
                .await
            }
        };

        let outcome = match &rule.condition {
            Condition::Literal(literal) => *literal,
            Condition::Tools(_) => {
                let outcomes: Vec<ToolOutcome> =
                    tool_results.iter().map(|report| report.outcome).collect();
                aggregate(&outcomes)
            }
        };

        debug!(router = %rule.name, outcome, tools = tool_results.len(), "rule evaluated");

        let render_target = if outcome {
            rule.then_branch.clone()
        } else {
            rule.else_branch.clone()
        };

        Decision {
            router: rule.name.clone(),
            outcome,
            render_target,
            meta: rule.meta.clone(),
            tool_results,
        }
    }

    async fn run_tool(
        &self,
        router: &str,
        tool: &ToolInvocation,
        mask: &Mask,
        ctx: &RequestContext,
    ) -> ToolReport {
        let args = match mask_object(&tool.args, mask) {
            Ok(args) => args,
            Err(err) => {
                warn!(router, tool = %tool.kind, error = %err, "failed to mask tool arguments");
                return ToolReport::new(tool.kind.name(), ToolOutcome::Undecided);
            }
        };

        let outcome = self.registry.evaluate(&tool.kind, &args, ctx).await;
        debug!(router, tool = %tool.kind, ?outcome, "tool evaluated");
        ToolReport::new(tool.kind.name(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::geo::{NullGeoLocator, StaticGeoLocator};
    use crate::rule::OutputKind;
    use serde_json::{json, Value};
    use trafficlight_protocol::client::GeoRecord;

    fn evaluator() -> RuleEvaluator {
        RuleEvaluator::new(PredicateRegistry::new(Arc::new(NullGeoLocator), false))
    }

    fn rule(condition: Value) -> RuleDefinition {
        RuleDefinition::from_value(
            "test",
            &json!({
                "meta": {"group": "g"},
                "if": condition,
                "then": {"type": "JSON", "data": {"raw": "then"}},
                "else": {"type": "HTML", "data": {"raw": "else"}}
            }),
        )
        .expect("valid rule")
    }

    fn request(url: &str) -> RequestContext {
        RequestContext::builder("GET", url).build()
    }

    #[tokio::test]
    async fn literal_true_selects_then() {
        let decision = evaluator().evaluate(&rule(json!(true)), &request("/")).await;
        assert!(decision.outcome);
        assert_eq!(decision.render_target.kind, Some(OutputKind::Json));
        assert!(decision.tool_results.is_empty());
        assert_eq!(decision.meta.and_then(|m| m.group).as_deref(), Some("g"));
    }

    #[tokio::test]
    async fn literal_false_selects_else() {
        let decision = evaluator().evaluate(&rule(json!(false)), &request("/")).await;
        assert!(!decision.outcome);
        assert_eq!(decision.render_target.kind, Some(OutputKind::Html));
    }

    #[tokio::test]
    async fn empty_tools_pass_vacuously() {
        let decision = evaluator()
            .evaluate(&rule(json!({"tools": []})), &request("/"))
            .await;
        assert!(decision.outcome);
    }

    #[tokio::test]
    async fn tool_arguments_are_masked_from_the_query() {
        let condition = json!({"tools": [{"EQ": {"value1": "$get.token", "value2": "secret"}}]});
        let evaluator = evaluator();

        let yes = evaluator.evaluate(&rule(condition.clone()), &request("/?token=secret")).await;
        let no = evaluator.evaluate(&rule(condition.clone()), &request("/?token=wrong")).await;
        let missing = evaluator.evaluate(&rule(condition), &request("/")).await;

        assert!(yes.outcome);
        assert!(!no.outcome);
        assert!(!missing.outcome);
    }

    // Undecided is not skipped: it fails the whole condition even when every
    // other tool passes.
    #[tokio::test]
    async fn undecided_tool_fails_the_condition() {
        let condition = json!({"tools": [
            {"EQ": {"value1": 1, "value2": 1}},
            {"NOT_A_TOOL": {}},
            {"NOT_EQ": {"value1": 1, "value2": 2}}
        ]});
        let decision = evaluator().evaluate(&rule(condition), &request("/")).await;

        assert!(!decision.outcome);
        assert_eq!(decision.render_target.kind, Some(OutputKind::Html));
        assert_eq!(decision.undecided_tools().count(), 1);
    }

    #[tokio::test]
    async fn every_tool_runs_after_an_early_failure() {
        let condition = json!({"tools": [
            {"EQ": {"value1": 1, "value2": 2}},
            {"EQ": {"value1": 1, "value2": 1}},
            "BOTS_APPLE_IP"
        ]});
        let decision = evaluator().evaluate(&rule(condition), &request("/")).await;

        let outcomes: Vec<_> = decision.tool_results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![ToolOutcome::Fail, ToolOutcome::Pass, ToolOutcome::Undecided]
        );
        assert_eq!(decision.tool_results[2].tool, "BOTS_APPLE_IP");
    }

    #[tokio::test]
    async fn ip_tool_uses_geolocation() {
        let geo = StaticGeoLocator::new()
            .with_record("8.8.8.8".parse().unwrap(), GeoRecord::with_country("US"));
        let evaluator = RuleEvaluator::new(PredicateRegistry::new(Arc::new(geo), false));
        let ctx = RequestContext::builder("GET", "/")
            .client_ip(Some("8.8.8.8".into()))
            .build();

        let us = evaluator
            .evaluate(&rule(json!({"tools": [{"IP": {"country": ["US"]}}]})), &ctx)
            .await;
        let br = evaluator
            .evaluate(&rule(json!({"tools": [{"IP": {"country": "BR"}}]})), &ctx)
            .await;
        assert!(us.outcome);
        assert!(!br.outcome);
    }

    #[tokio::test]
    async fn missing_else_yields_empty_descriptor() {
        let rule = RuleDefinition::from_value("x", &json!({"if": false, "then": {"type": "JSON"}}))
            .expect("valid");
        let decision = evaluator().evaluate(&rule, &request("/")).await;
        assert!(!decision.outcome);
        assert!(decision.render_target.is_empty());
    }
}
