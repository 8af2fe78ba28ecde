use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tracing::{debug, instrument};
use trafficlight_rules::{validate_router_name, RuleEvaluator, RuleSource};

use crate::analytics::AnalyticsRecorder;
use crate::dispatcher::OutputDispatcher;
use crate::enrichment::UserAgentParser;
use crate::error::GatewayError;
use crate::extract::request_context;
use crate::side_effects::SideEffectRunner;

/// Everything the dynamic router endpoint needs, constructed once at startup.
#[derive(Clone)]
pub struct RouterState {
    pub rules: Arc<dyn RuleSource>,
    pub evaluator: RuleEvaluator,
    pub dispatcher: OutputDispatcher,
    pub side_effects: SideEffectRunner,
    pub analytics: AnalyticsRecorder,
    pub user_agents: Arc<dyn UserAgentParser>,
    pub ip_header: String,
}

pub fn router(state: RouterState) -> Router {
    Router::new()
        .route("/:group/:route", get(route_request).post(route_request))
        .with_state(state)
}

#[instrument(skip_all, fields(router = tracing::field::Empty))]
async fn route_request(
    State(state): State<RouterState>,
    Path((_group, route)): Path<(String, String)>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let name = validate_router_name(&route)?;
    tracing::Span::current().record("router", &tracing::field::display(&name));
    let ctx = request_context(
        &method,
        &uri,
        &headers,
        &body,
        &state.ip_header,
        state.user_agents.as_ref(),
    );

    let rule = match state.rules.load(&name).await {
        Ok(rule) => rule,
        Err(err) => {
            if err.is_definition_error() {
                state.analytics.spawn_record(&name, &ctx, None, None);
            }
            return Err(err.into());
        }
    };

    let decision = state.evaluator.evaluate(&rule, &ctx).await;
    debug!(router = %name, outcome = decision.outcome, "decision reached");

    state
        .analytics
        .spawn_record(&name, &ctx, Some(decision.outcome), decision.meta.clone());
    state
        .side_effects
        .spawn_all(&name, &decision.render_target.also, &ctx);

    let response = state
        .dispatcher
        .dispatch(&decision.render_target, &ctx)
        .await?;
    Ok(response)
}
