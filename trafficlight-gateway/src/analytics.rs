use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trafficlight_core::db::DatabasePool;
use trafficlight_core::serde_utils::prune_nulls;
use trafficlight_core::TrafficLightError;
use trafficlight_protocol::analytics::{AnalyticsRecord, RouterMeta};
use trafficlight_protocol::client::GeoRecord;
use trafficlight_protocol::request::RequestContext;
use trafficlight_rules::GeoLocator;

use crate::config::AnalyticsConfig;

/// Query keys copied into `mobileTrackingBaseGroup`.
const MOBILE_TRACKING_KEYS: [&str; 4] = ["_device", "_model", "_deviceHash", "_time"];

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics storage error: {0}")]
    Storage(String),
    #[error("failed to serialise analytics record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for AnalyticsError {
    fn from(err: sqlx::Error) -> Self {
        AnalyticsError::Storage(err.to_string())
    }
}

impl From<TrafficLightError> for AnalyticsError {
    fn from(err: TrafficLightError) -> Self {
        AnalyticsError::Storage(err.to_string())
    }
}

/// Append-only destination for traffic records.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, record: &AnalyticsRecord) -> Result<(), AnalyticsError>;

    /// Deletes records of routers flagged `noindex`. Returns how many were removed.
    async fn purge_noindex(&self) -> Result<u64, AnalyticsError>;

    fn describe(&self) -> &'static str;
}

/// Serialises a record for storage with nulls pruned. `decision` is always kept.
pub fn to_storage_value(record: &AnalyticsRecord) -> Result<Value, AnalyticsError> {
    let value = serde_json::to_value(record)?;
    let mut pruned = prune_nulls(value).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut pruned {
        map.insert(
            "decision".to_string(),
            record.decision.map(Value::Bool).unwrap_or(Value::Null),
        );
    }
    Ok(pruned)
}

struct StoredRecord {
    noindex: bool,
    payload: Value,
}

/// Bounded in-memory ring buffer; oldest records are dropped first.
#[derive(Clone)]
pub struct MemoryAnalyticsSink {
    capacity: usize,
    records: Arc<Mutex<VecDeque<StoredRecord>>>,
}

impl MemoryAnalyticsSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Stored payloads, newest first.
    pub async fn records(&self) -> Vec<Value> {
        let guard = self.records.lock().await;
        guard.iter().map(|stored| stored.payload.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalyticsSink {
    async fn record(&self, record: &AnalyticsRecord) -> Result<(), AnalyticsError> {
        let payload = to_storage_value(record)?;
        let mut guard = self.records.lock().await;
        guard.push_front(StoredRecord {
            noindex: record.is_noindex(),
            payload,
        });
        while guard.len() > self.capacity {
            guard.pop_back();
        }
        Ok(())
    }

    async fn purge_noindex(&self) -> Result<u64, AnalyticsError> {
        let mut guard = self.records.lock().await;
        let before = guard.len();
        guard.retain(|stored| !stored.noindex);
        Ok((before - guard.len()) as u64)
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

/// Postgres sink writing to `router_traffic`.
#[derive(Clone)]
pub struct PostgresAnalyticsSink {
    pool: DatabasePool,
}

impl PostgresAnalyticsSink {
    /// Connects and runs the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self, AnalyticsError> {
        let pool = DatabasePool::connect_with_url(database_url).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: DatabasePool) -> Result<Self, AnalyticsError> {
        sqlx::migrate!("./migrations")
            .run(pool.inner())
            .await
            .map_err(|err| AnalyticsError::Storage(err.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl AnalyticsSink for PostgresAnalyticsSink {
    async fn record(&self, record: &AnalyticsRecord) -> Result<(), AnalyticsError> {
        let payload = to_storage_value(record)?;
        sqlx::query(
            r#"
            INSERT INTO router_traffic (client_id, router, click_at, noindex, decision, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.client_id)
        .bind(&record.router)
        .bind(record.click_at)
        .bind(record.is_noindex())
        .bind(record.decision)
        .bind(payload)
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    async fn purge_noindex(&self) -> Result<u64, AnalyticsError> {
        let result = sqlx::query("DELETE FROM router_traffic WHERE noindex")
            .execute(self.pool.inner())
            .await?;
        Ok(result.rows_affected())
    }

    fn describe(&self) -> &'static str {
        "postgres"
    }
}

/// Builds traffic records and hands them to the sink without blocking responses.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    sink: Arc<dyn AnalyticsSink>,
    geo: Arc<dyn GeoLocator>,
    enabled: bool,
    mobile_tracking: bool,
}

impl AnalyticsRecorder {
    pub fn new(
        sink: Arc<dyn AnalyticsSink>,
        geo: Arc<dyn GeoLocator>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            sink,
            geo,
            enabled: config.register_traffic,
            mobile_tracking: config.mobile_tracking,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sink(&self) -> &Arc<dyn AnalyticsSink> {
        &self.sink
    }

    /// Assembles the record for one request. `decision` is `None` for invalid definitions.
    pub fn build_record(
        &self,
        router: &str,
        ctx: &RequestContext,
        decision: Option<bool>,
        meta: Option<RouterMeta>,
    ) -> AnalyticsRecord {
        let mobile = self
            .mobile_tracking
            .then(|| mobile_tracking_group(ctx));

        AnalyticsRecord::new(router, ctx, decision)
            .with_meta(meta)
            .with_geo(self.locate(ctx))
            .with_mobile_tracking(mobile)
    }

    /// Records in a detached task. Returns `None` when recording is disabled.
    pub fn spawn_record(
        &self,
        router: &str,
        ctx: &RequestContext,
        decision: Option<bool>,
        meta: Option<RouterMeta>,
    ) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }

        let record = self.build_record(router, ctx, decision, meta);
        let sink = Arc::clone(&self.sink);
        Some(tokio::spawn(async move {
            if let Err(err) = sink.record(&record).await {
                warn!(router = %record.router, error = %err, "failed to record traffic");
            }
        }))
    }

    fn locate(&self, ctx: &RequestContext) -> Option<GeoRecord> {
        let ip: IpAddr = ctx.client_ip.as_deref()?.trim().parse().ok()?;
        match self.geo.lookup(ip) {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "geolocation unavailable for analytics");
                None
            }
        }
    }
}

fn mobile_tracking_group(ctx: &RequestContext) -> BTreeMap<String, String> {
    MOBILE_TRACKING_KEYS
        .iter()
        .filter_map(|key| {
            ctx.query
                .get(*key)
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect()
}

/// Periodic job that deletes records of `noindex` routers.
pub struct PurgeJob {
    sink: Arc<dyn AnalyticsSink>,
    interval: Duration,
}

impl PurgeJob {
    pub fn new(sink: Arc<dyn AnalyticsSink>, interval: Duration) -> Self {
        Self { sink, interval }
    }

    /// Runs one purge pass.
    pub async fn run_once(&self) -> Result<u64, AnalyticsError> {
        let removed = self.sink.purge_noindex().await?;
        if removed > 0 {
            info!(removed, sink = self.sink.describe(), "purged noindex traffic");
        }
        Ok(removed)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // First tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    warn!(error = %err, "noindex purge failed");
                }
            }
        })
    }
}
