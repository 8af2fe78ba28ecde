use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use trafficlight_protocol::request::RequestContext;
use trafficlight_rules::{render_raw, OutputDescriptor, OutputKind};

use crate::proxy::{convert_response, ProxyError, UpstreamFetcher};

const ROOT_PLACEHOLDERS: [&str; 3] = ["$PWD", "$CWD", "$ROOT"];

/// Rendering failures. All of them abort the response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("resource unavailable")]
    ResourceUnavailable,
    #[error("resource corrupted: {0}")]
    ResourceCorrupted(String),
    #[error("redirect target unavailable")]
    RedirectUnavailable,
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Renders a selected output descriptor into an HTTP response.
#[derive(Clone)]
pub struct OutputDispatcher {
    root_dir: PathBuf,
    upstream: Arc<dyn UpstreamFetcher>,
}

impl OutputDispatcher {
    pub fn new(root_dir: impl Into<PathBuf>, upstream: Arc<dyn UpstreamFetcher>) -> Self {
        Self {
            root_dir: root_dir.into(),
            upstream,
        }
    }

    pub async fn dispatch(
        &self,
        descriptor: &OutputDescriptor,
        ctx: &RequestContext,
    ) -> Result<Response, DispatchError> {
        let Some(kind) = descriptor.kind else {
            return Ok(empty_response());
        };
        debug!(%kind, "dispatching output");

        match kind {
            OutputKind::Json => self.json(descriptor, ctx).await,
            OutputKind::Html => self.html(descriptor).await,
            OutputKind::Redirect => redirect(descriptor),
            OutputKind::ProxyPass => self.proxy_pass(descriptor).await,
        }
    }

    /// Expands `$PWD`, `$CWD` and `$ROOT`; relative results are joined to the root.
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let root = self.root_dir.to_string_lossy();
        let expanded = ROOT_PLACEHOLDERS
            .iter()
            .fold(file.to_string(), |acc, placeholder| acc.replace(placeholder, &root));
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            path
        } else {
            self.root_dir.join(path)
        }
    }

    async fn json(
        &self,
        descriptor: &OutputDescriptor,
        ctx: &RequestContext,
    ) -> Result<Response, DispatchError> {
        let body = match self.read_file(descriptor).await? {
            Some(bytes) => serde_json::from_slice::<Value>(&bytes)
                .map_err(|err| DispatchError::ResourceCorrupted(err.to_string()))?,
            None => match &descriptor.data.raw {
                Some(raw) => render_raw(raw, ctx),
                None => return Err(DispatchError::ResourceUnavailable),
            },
        };

        let bytes = serde_json::to_vec(&body)
            .map_err(|err| DispatchError::ResourceCorrupted(err.to_string()))?;
        Ok(with_content_type(bytes, "application/json"))
    }

    async fn html(&self, descriptor: &OutputDescriptor) -> Result<Response, DispatchError> {
        let bytes = match self.read_file(descriptor).await? {
            Some(bytes) => bytes,
            None => match &descriptor.data.raw {
                Some(Value::String(html)) => html.clone().into_bytes(),
                Some(other) => other.to_string().into_bytes(),
                None => return Err(DispatchError::ResourceUnavailable),
            },
        };
        Ok(with_content_type(bytes, "text/html; charset=utf-8"))
    }

    async fn proxy_pass(&self, descriptor: &OutputDescriptor) -> Result<Response, DispatchError> {
        let Some(Value::String(url)) = &descriptor.data.raw else {
            return Err(ProxyError::InvalidTarget.into());
        };
        let upstream = self.upstream.fetch(url).await?;
        Ok(convert_response(upstream))
    }

    /// Reads `data.file` when it points at an existing file.
    async fn read_file(&self, descriptor: &OutputDescriptor) -> Result<Option<Vec<u8>>, DispatchError> {
        let Some(file) = descriptor.data.file.as_deref() else {
            return Ok(None);
        };
        let path = self.resolve_path(file);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                if descriptor.data.raw.is_some() {
                    debug!(path = %path.display(), "file exists, ignoring raw output");
                }
                Ok(Some(bytes))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                warn!(path = %display_name(&path), error = %err, "failed to read output file");
                Err(DispatchError::ResourceUnavailable)
            }
        }
    }
}

fn redirect(descriptor: &OutputDescriptor) -> Result<Response, DispatchError> {
    let Some(Value::String(target)) = &descriptor.data.raw else {
        return Err(DispatchError::RedirectUnavailable);
    };
    let location =
        HeaderValue::from_str(target).map_err(|_| DispatchError::RedirectUnavailable)?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

fn empty_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
}

fn with_content_type(bytes: Vec<u8>, content_type: &'static str) -> Response {
    let mut response = Response::new(Body::from(bytes));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::UpstreamResponse;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::fs;
    use trafficlight_rules::OutputData;

    struct StaticUpstream(Result<UpstreamResponse, u16>);

    #[async_trait]
    impl UpstreamFetcher for StaticUpstream {
        async fn fetch(&self, _url: &str) -> Result<UpstreamResponse, ProxyError> {
            self.0.clone().map_err(ProxyError::Status)
        }
    }

    fn dispatcher(root: &Path) -> OutputDispatcher {
        let upstream = StaticUpstream(Ok(UpstreamResponse {
            status: 200,
            headers: vec![("x-up".into(), "1".into())],
            body: Bytes::from_static(b"upstream"),
        }));
        OutputDispatcher::new(root, Arc::new(upstream))
    }

    fn descriptor(kind: OutputKind, file: Option<&str>, raw: Option<Value>) -> OutputDescriptor {
        OutputDescriptor {
            kind: Some(kind),
            data: OutputData {
                file: file.map(str::to_string),
                raw,
            },
            also: vec![],
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::builder("GET", "/router/x?a=1").build()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn empty_descriptor_is_plain_success() {
        let dir = tempfile::tempdir().unwrap();
        let response = dispatcher(dir.path())
            .dispatch(&OutputDescriptor::empty(), &ctx())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn existing_file_wins_over_raw() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"a":1}"#).unwrap();

        let response = dispatcher(dir.path())
            .dispatch(
                &descriptor(OutputKind::Json, Some("$PWD/a.json"), Some(json!({"b": 2}))),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body, json!({"a": 1}));
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_templated_raw() {
        let dir = tempfile::tempdir().unwrap();
        let response = dispatcher(dir.path())
            .dispatch(
                &descriptor(OutputKind::Json, Some("missing.json"), Some(json!({"req": "$request"}))),
                &ctx(),
            )
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["req"]["query"]["a"], "1");
        assert_eq!(body["req"]["method"], "GET");
    }

    #[tokio::test]
    async fn json_without_file_or_raw_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = dispatcher(dir.path())
            .dispatch(&descriptor(OutputKind::Json, Some("nope.json"), None), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ResourceUnavailable));
    }

    #[tokio::test]
    async fn corrupted_json_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let err = dispatcher(dir.path())
            .dispatch(
                &descriptor(OutputKind::Json, Some("$ROOT/bad.json"), Some(json!({"ok": true}))),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ResourceCorrupted(_)));
    }

    #[tokio::test]
    async fn html_serves_file_bytes_or_raw() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.html"), "<p>file</p>").unwrap();
        let dispatcher = dispatcher(dir.path());

        let file = dispatcher
            .dispatch(&descriptor(OutputKind::Html, Some("$CWD/page.html"), None), &ctx())
            .await
            .unwrap();
        assert_eq!(file.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body_bytes(file).await, b"<p>file</p>");

        let raw = dispatcher
            .dispatch(&descriptor(OutputKind::Html, None, Some(json!("<p>raw</p>"))), &ctx())
            .await
            .unwrap();
        assert_eq!(body_bytes(raw).await, b"<p>raw</p>");

        let structured = dispatcher
            .dispatch(&descriptor(OutputKind::Html, None, Some(json!({"x": 1}))), &ctx())
            .await
            .unwrap();
        assert_eq!(body_bytes(structured).await, br#"{"x":1}"#);
    }

    #[tokio::test]
    async fn html_file_wins_over_raw() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.html"), "<p>file</p>").unwrap();
        let dispatcher = dispatcher(dir.path());

        let response = dispatcher
            .dispatch(
                &descriptor(OutputKind::Html, Some("$PWD/page.html"), Some(json!("<p>raw</p>"))),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body_bytes(response).await, b"<p>file</p>");

        let fallback = dispatcher
            .dispatch(
                &descriptor(OutputKind::Html, Some("$PWD/absent.html"), Some(json!("<p>raw</p>"))),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(body_bytes(fallback).await, b"<p>raw</p>");
    }

    #[tokio::test]
    async fn redirect_sets_location() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());
        let response = dispatcher
            .dispatch(
                &descriptor(OutputKind::Redirect, None, Some(json!("https://example.com/x"))),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://example.com/x");

        let err = dispatcher
            .dispatch(&descriptor(OutputKind::Redirect, None, Some(json!(42))), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RedirectUnavailable));
    }

    #[tokio::test]
    async fn proxy_pass_relays_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let response = dispatcher(dir.path())
            .dispatch(
                &descriptor(OutputKind::ProxyPass, None, Some(json!("https://upstream.test"))),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-up"], "1");
        assert_eq!(body_bytes(response).await, b"upstream");
    }

    #[tokio::test]
    async fn proxy_failures_are_dispatch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let failing = OutputDispatcher::new(dir.path(), Arc::new(StaticUpstream(Err(500))));
        let err = failing
            .dispatch(
                &descriptor(OutputKind::ProxyPass, None, Some(json!("https://upstream.test"))),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Proxy(ProxyError::Status(500))));

        let err = failing
            .dispatch(&descriptor(OutputKind::ProxyPass, None, None), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Proxy(ProxyError::InvalidTarget)));
    }

    #[test]
    fn resolves_placeholders_against_root() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(dir.path());
        assert_eq!(dispatcher.resolve_path("$PWD/a.json"), dir.path().join("a.json"));
        assert_eq!(dispatcher.resolve_path("data/b.json"), dir.path().join("data/b.json"));
        assert_eq!(dispatcher.resolve_path("/abs/c.json"), PathBuf::from("/abs/c.json"));
    }
}
