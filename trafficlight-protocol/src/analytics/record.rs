use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{GeoRecord, UserAgentInfo};
use crate::request::RequestContext;

/// Classification metadata attached to a rule definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub noindex: bool,
}

/// HTTP portion of an analytics record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSnapshot {
    pub http_path: String,
    pub http_query: BTreeMap<String, String>,
    pub http_method: String,
    pub http_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub http_body: Value,
}

impl From<&RequestContext> for HttpSnapshot {
    fn from(ctx: &RequestContext) -> Self {
        Self {
            http_path: ctx.path.clone(),
            http_query: ctx.query.clone(),
            http_method: ctx.method.clone(),
            http_headers: ctx.headers.clone(),
            http_body: ctx.body.clone(),
        }
    }
}

/// One traffic record per evaluated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    pub client_id: String,
    pub click_at: DateTime<Utc>,
    pub router: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_meta: Option<RouterMeta>,
    pub http: HttpSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua: Option<UserAgentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_client_info: Option<GeoRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_tracking_base_group: Option<BTreeMap<String, String>>,
    /// `None` when the rule definition could not be evaluated.
    pub decision: Option<bool>,
}

impl AnalyticsRecord {
    pub fn new(router: impl Into<String>, ctx: &RequestContext, decision: Option<bool>) -> Self {
        Self {
            client_id: ctx.client_id.clone(),
            click_at: Utc::now(),
            router: router.into(),
            router_meta: None,
            http: HttpSnapshot::from(ctx),
            ua: ctx.ua.clone(),
            remote_client_info: None,
            mobile_tracking_base_group: None,
            decision,
        }
    }

    pub fn with_meta(mut self, meta: Option<RouterMeta>) -> Self {
        self.router_meta = meta;
        self
    }

    pub fn with_geo(mut self, geo: Option<GeoRecord>) -> Self {
        self.remote_client_info = geo;
        self
    }

    pub fn with_mobile_tracking(mut self, group: Option<BTreeMap<String, String>>) -> Self {
        self.mobile_tracking_base_group = group.filter(|group| !group.is_empty());
        self
    }

    pub fn is_noindex(&self) -> bool {
        self.router_meta
            .as_ref()
            .map(|meta| meta.noindex)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_camel_case() {
        let ctx = RequestContext::builder("GET", "/router/a?x=1")
            .client_ip(Some("10.0.0.1".into()))
            .build();
        let record = AnalyticsRecord::new("a", &ctx, Some(true)).with_meta(Some(RouterMeta {
            group: Some("promo".into()),
            noindex: true,
        }));

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["clientId"], ctx.client_id);
        assert_eq!(value["http"]["httpPath"], "/router/a");
        assert_eq!(value["http"]["httpQuery"]["x"], "1");
        assert_eq!(value["routerMeta"]["group"], "promo");
        assert_eq!(value["decision"], true);
        assert!(value.get("remoteClientInfo").is_none());
        assert!(record.is_noindex());
    }

    #[test]
    fn empty_mobile_group_is_dropped() {
        let ctx = RequestContext::builder("GET", "/").build();
        let record = AnalyticsRecord::new("a", &ctx, None).with_mobile_tracking(Some(BTreeMap::new()));
        assert!(record.mobile_tracking_base_group.is_none());
        assert!(record.decision.is_none());
    }
}
