use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use trafficlight_rules::{
    FileSystemRuleSource, GeoLocator, PredicateRegistry, RuleEvaluator, RuleSource,
};

use crate::analytics::{
    AnalyticsRecorder, AnalyticsSink, MemoryAnalyticsSink, PostgresAnalyticsSink, PurgeJob,
};
use crate::config::GatewayConfig;
use crate::dispatcher::OutputDispatcher;
use crate::enrichment::{load_geo_locator, UserAgentParser, WootheeParser};
use crate::health::{router as health_router, HealthState};
use crate::proxy::{ReqwestUpstream, UpstreamFetcher};
use crate::router_routes::{router as traffic_router, RouterState};
use crate::side_effects::SideEffectRunner;

/// External collaborators of the gateway. Tests swap these for in-memory versions.
#[derive(Clone)]
pub struct GatewayComponents {
    pub rules: Arc<dyn RuleSource>,
    pub geo: Arc<dyn GeoLocator>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub upstream: Arc<dyn UpstreamFetcher>,
    pub user_agents: Arc<dyn UserAgentParser>,
    pub client: reqwest::Client,
}

impl GatewayComponents {
    /// Production wiring: file-system rules, MaxMind geolocation, Postgres or memory analytics.
    pub async fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let analytics: Arc<dyn AnalyticsSink> = match config.analytics().database_url.as_deref() {
            Some(url) => Arc::new(
                PostgresAnalyticsSink::connect(url)
                    .await
                    .context("failed to initialise analytics database")?,
            ),
            None => Arc::new(MemoryAnalyticsSink::new(config.analytics().memory_capacity)),
        };

        Ok(Self {
            rules: Arc::new(FileSystemRuleSource::new(&config.router_dir)),
            geo: load_geo_locator(&config.geoip_db),
            analytics,
            upstream: Arc::new(
                ReqwestUpstream::new(client.clone(), config.proxy_timeout)
                    .with_max_body(config.proxy_max_body),
            ),
            user_agents: Arc::new(WootheeParser),
            client,
        })
    }

    /// Wiring with no external systems: given rules, no geolocation, memory analytics.
    pub fn in_memory(rules: Arc<dyn RuleSource>, config: &GatewayConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            rules,
            geo: Arc::new(trafficlight_rules::NullGeoLocator),
            analytics: Arc::new(MemoryAnalyticsSink::new(config.analytics().memory_capacity)),
            upstream: Arc::new(
                ReqwestUpstream::new(client.clone(), config.proxy_timeout)
                    .with_max_body(config.proxy_max_body),
            ),
            user_agents: Arc::new(WootheeParser),
            client,
        }
    }
}

pub struct GatewayApp {
    pub router: Router,
    pub maintenance: PurgeJob,
}

pub fn build_app(components: GatewayComponents, config: &GatewayConfig) -> GatewayApp {
    let GatewayComponents {
        rules,
        geo,
        analytics,
        upstream,
        user_agents,
        client,
    } = components;

    let registry = PredicateRegistry::new(Arc::clone(&geo), config.allow_insufficient_ip);
    let router_state = RouterState {
        rules: Arc::clone(&rules),
        evaluator: RuleEvaluator::new(registry),
        dispatcher: OutputDispatcher::new(config.root_dir.clone(), upstream),
        side_effects: SideEffectRunner::new(client, config.action_timeout),
        analytics: AnalyticsRecorder::new(Arc::clone(&analytics), Arc::clone(&geo), config.analytics()),
        user_agents,
        ip_header: config.ip_header.clone(),
    };

    let health_state = HealthState::new(
        rules,
        Arc::clone(&analytics),
        geo,
        config.analytics().register_traffic,
    );

    let router = Router::new()
        .merge(health_router(health_state))
        .merge(traffic_router(router_state))
        .layer(TraceLayer::new_for_http());

    GatewayApp {
        router,
        maintenance: PurgeJob::new(analytics, config.analytics().noindex_purge_interval),
    }
}

/// Loads every known definition once and logs the broken ones.
pub async fn preflight_rules(rules: &dyn RuleSource) -> PreflightReport {
    let names = match rules.names().await {
        Ok(names) => names,
        Err(err) => {
            warn!(error = %err, "cannot list rule definitions");
            return PreflightReport::default();
        }
    };

    let mut report = PreflightReport::default();
    for name in names {
        match rules.load(&name).await {
            Ok(_) => report.valid.push(name),
            Err(err) => {
                warn!(router = %name, error = %err, "rule definition will fail at request time");
                report.invalid.push(name);
            }
        }
    }
    info!(
        valid = report.valid.len(),
        invalid = report.invalid.len(),
        "rule definitions checked"
    );
    report
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}
