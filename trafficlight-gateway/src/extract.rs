use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use tracing::debug;
use trafficlight_protocol::request::RequestContext;

use crate::enrichment::UserAgentParser;

const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Builds the request context seen by the evaluator.
pub fn request_context(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
    ip_header: &str,
    user_agents: &dyn UserAgentParser,
) -> RequestContext {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_string);
    let parsed_ua = user_agent.as_deref().and_then(|raw| user_agents.parse(raw));

    let mut builder = RequestContext::builder(method.as_str(), url)
        .body(parse_body(headers, body))
        .client_ip(client_ip(headers, ip_header))
        .user_agent(user_agent, parsed_ua);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            builder = builder.header(name.as_str(), value);
        }
    }

    builder.build()
}

/// `cf-connecting-ip` first, then the configured forward header.
pub fn client_ip(headers: &HeaderMap, ip_header: &str) -> Option<String> {
    header_str(headers, CF_CONNECTING_IP)
        .or_else(|| header_str(headers, ip_header))
        .map(|raw| raw.split(',').next().unwrap_or(raw).trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_body(headers: &HeaderMap, body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    let content_type = header_str(headers, header::CONTENT_TYPE.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        serde_json::from_slice(body).unwrap_or_else(|err| {
            debug!(error = %err, "ignoring malformed json body");
            Value::Null
        })
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut form = Map::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            form.entry(key.into_owned())
                .or_insert_with(|| Value::String(value.into_owned()));
        }
        Value::Object(form)
    } else {
        Value::Null
    }
}
