use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, warn};
use trafficlight_rules::{GeoLocator, RuleSource};

use crate::analytics::AnalyticsSink;

#[derive(Clone)]
pub struct HealthState {
    rules: Arc<dyn RuleSource>,
    analytics: Arc<dyn AnalyticsSink>,
    geo: Arc<dyn GeoLocator>,
    recording: bool,
}

impl HealthState {
    pub fn new(
        rules: Arc<dyn RuleSource>,
        analytics: Arc<dyn AnalyticsSink>,
        geo: Arc<dyn GeoLocator>,
        recording: bool,
    ) -> Self {
        Self {
            rules,
            analytics,
            geo,
            recording,
        }
    }
}

/// Client-facing text for a failing rule source; the cause is only logged.
const RULES_UNAVAILABLE: &str = "rule directory unavailable";

#[derive(Serialize)]
struct RulesHealth {
    healthy: bool,
    routers: usize,
    message: Option<String>,
}

#[derive(Serialize)]
struct AnalyticsHealth {
    sink: &'static str,
    recording: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    rules: RulesHealth,
    analytics: AnalyticsHealth,
    geo: &'static str,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    let rules = match state.rules.names().await {
        Ok(names) => RulesHealth {
            healthy: true,
            routers: names.len(),
            message: None,
        },
        Err(err) => {
            warn!(error = %err, "rule source unavailable");
            RulesHealth {
                healthy: false,
                routers: 0,
                message: Some(RULES_UNAVAILABLE.to_string()),
            }
        }
    };
    debug!(routers = rules.routers, "health check");

    Json(HealthResponse {
        status: if rules.healthy { "ok" } else { "degraded" }.to_string(),
        rules,
        analytics: AnalyticsHealth {
            sink: state.analytics.describe(),
            recording: state.recording,
        },
        geo: state.geo.describe(),
    })
}
