use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use thiserror::Error;
use tracing::debug;

/// Header set sent upstream so naive bot filters treat us as a browser.
const BROWSER_HEADERS: [(&str, &str); 12] = [
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("accept-language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"),
    ("cache-control", "max-age=0"),
    (
        "sec-ch-ua",
        "\"Chromium\";v=\"122\", \"Not(A:Brand\";v=\"24\", \"Google Chrome\";v=\"122\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"macOS\""),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
    (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    ),
];

/// Hop-by-hop or recomputed headers that are never relayed.
const SKIPPED_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Default cap on a relayed upstream body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy target is not a string url")]
    InvalidTarget,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream answered with status {0}")]
    Status(u16),
    #[error("upstream body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

/// Response captured from an upstream fetch.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Performs the PROXYPASS upstream fetch.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, ProxyError>;
}

/// `reqwest`-backed fetcher using the browser header set.
#[derive(Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
    timeout: Duration,
    max_body: usize,
}

impl ReqwestUpstream {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            max_body: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }
}

#[async_trait]
impl UpstreamFetcher for ReqwestUpstream {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, ProxyError> {
        let mut builder = self.client.get(url).timeout(self.timeout);
        for (name, value) in BROWSER_HEADERS {
            builder = builder.header(name, value);
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(ProxyError::Status(status));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = read_bounded(&mut response, self.max_body).await?;
        debug!(%url, status, bytes = body.len(), "fetched upstream");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Reads the body chunk by chunk, failing as soon as it passes `max_body`.
async fn read_bounded(response: &mut reqwest::Response, max_body: usize) -> Result<Bytes, ProxyError> {
    if let Some(declared) = response.content_length() {
        if declared > max_body as u64 {
            return Err(ProxyError::BodyTooLarge(max_body));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > max_body {
            return Err(ProxyError::BodyTooLarge(max_body));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(body))
}

/// Relays an upstream response to the caller.
pub fn convert_response(upstream: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &upstream.headers {
        if SKIPPED_HEADERS
            .iter()
            .any(|skipped| name.eq_ignore_ascii_case(skipped))
        {
            continue;
        }
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(header_name, header_value);
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_browser_headers_and_captures_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .and(header_matcher("sec-fetch-mode", "navigate"))
            .and(header_matcher("upgrade-insecure-requests", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "yes")
                    .set_body_string("<h1>hi</h1>"),
            )
            .mount(&server)
            .await;

        let fetcher = ReqwestUpstream::new(reqwest::Client::new(), Duration::from_secs(5));
        let response = fetcher
            .fetch(&format!("{}/landing", server.uri()))
            .await
            .expect("upstream response");

        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"<h1>hi</h1>");
        assert!(response
            .headers
            .iter()
            .any(|(name, value)| name == "x-upstream" && value == "yes"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = ReqwestUpstream::new(reqwest::Client::new(), Duration::from_secs(5));
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Status(503)));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&server)
            .await;

        let fetcher = ReqwestUpstream::new(reqwest::Client::new(), Duration::from_secs(5))
            .with_max_body(16);
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ProxyError::BodyTooLarge(16)));

        let roomy = ReqwestUpstream::new(reqwest::Client::new(), Duration::from_secs(5))
            .with_max_body(64);
        let response = roomy.fetch(&server.uri()).await.expect("body within limit");
        assert_eq!(response.body.len(), 64);
    }

    #[test]
    fn convert_response_drops_hop_headers() {
        let response = convert_response(UpstreamResponse {
            status: 201,
            headers: vec![
                ("content-length".into(), "3".into()),
                ("connection".into(), "keep-alive".into()),
                ("content-type".into(), "text/plain".into()),
                ("set-cookie".into(), "a=1".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
            body: Bytes::from_static(b"abc"),
        });

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("connection").is_none());
        assert!(response.headers().get("content-length").is_none());
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
    }
}
