use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::identity::client_identity;
use crate::client::UserAgentInfo;

/// Observable attributes of one inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    /// Path plus query string, as received.
    pub url: String,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Lowercased header names; the first value wins for repeated headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<UserAgentInfo>,
    pub client_id: String,
}

impl RequestContext {
    pub fn builder(method: impl Into<String>, url: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder::new(method, url)
    }

    /// Composite used for output-level templating: `{url, method, path, query}`.
    pub fn summary(&self) -> Value {
        json!({
            "url": self.url,
            "method": self.method,
            "path": self.path,
            "query": self.query,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers_value(&self) -> Value {
        json!(self.headers)
    }

    /// Top-level request attributes keyed by their camelCase name.
    pub fn attributes(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("method", Value::String(self.method.clone())),
            ("url", Value::String(self.url.clone())),
            ("path", Value::String(self.path.clone())),
            ("query", json!(self.query)),
            ("headers", self.headers_value()),
            ("body", self.body.clone()),
            (
                "clientIp",
                self.client_ip.clone().map(Value::String).unwrap_or(Value::Null),
            ),
            (
                "userAgent",
                self.user_agent.clone().map(Value::String).unwrap_or(Value::Null),
            ),
        ]
    }
}

/// Builder for [`RequestContext`]; computes the client identity on `build`.
pub struct RequestContextBuilder {
    ctx: RequestContext,
}

impl RequestContextBuilder {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = split_url(&url);

        Self {
            ctx: RequestContext {
                method: method.into().to_ascii_uppercase(),
                url,
                path,
                query,
                headers: BTreeMap::new(),
                body: Value::Null,
                client_ip: None,
                user_agent: None,
                ua: None,
                client_id: String::new(),
            },
        }
    }

    /// Adds a header unless one with the same (case-insensitive) name exists.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.ctx
            .headers
            .entry(name.as_ref().to_ascii_lowercase())
            .or_insert_with(|| value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.ctx.body = body;
        self
    }

    pub fn client_ip(mut self, ip: Option<String>) -> Self {
        self.ctx.client_ip = ip.filter(|ip| !ip.trim().is_empty());
        self
    }

    pub fn user_agent(mut self, raw: Option<String>, parsed: Option<UserAgentInfo>) -> Self {
        self.ctx.user_agent = raw;
        self.ctx.ua = parsed;
        self
    }

    pub fn build(mut self) -> RequestContext {
        self.ctx.client_id = client_identity(
            self.ctx.client_ip.as_deref(),
            self.ctx.user_agent.as_deref(),
        );
        self.ctx
    }
}

fn split_url(url: &str) -> (String, BTreeMap<String, String>) {
    let (path, raw_query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };

    let mut query = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        query
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    let path = if path.is_empty() { "/" } else { path };
    (path.to_string(), query)
}
