use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use trafficlight_protocol::request::RequestContext;
use trafficlight_rules::{action_mask, mask_object, AlsoActionKind, AlsoInvocation, TemplateError};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action props are missing")]
    MissingProps,
    #[error("httpCall requires a string `url`")]
    MissingUrl,
    #[error("unsupported http method {0:?}")]
    InvalidMethod(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("outbound call failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Runs `also` actions after a decision. Failures stay local.
#[derive(Clone)]
pub struct SideEffectRunner {
    client: reqwest::Client,
    timeout_cap: Duration,
}

impl SideEffectRunner {
    pub fn new(client: reqwest::Client, timeout_cap: Duration) -> Self {
        Self {
            client,
            timeout_cap,
        }
    }

    /// Spawns one detached task per action; the handles are returned for callers
    /// that want to wait (tests, mostly).
    pub fn spawn_all(
        &self,
        router: &str,
        actions: &[AlsoInvocation],
        ctx: &RequestContext,
    ) -> Vec<JoinHandle<()>> {
        actions
            .iter()
            .filter(|action| !action.name.is_empty())
            .map(|action| {
                let runner = self.clone();
                let action = action.clone();
                let ctx = ctx.clone();
                let router = router.to_string();
                tokio::spawn(async move {
                    match runner.run_action(&action, &ctx).await {
                        Ok(_) => debug!(%router, action = %action.name, "action completed"),
                        Err(err) => {
                            warn!(%router, action = %action.name, error = %err, "action failed")
                        }
                    }
                })
            })
            .collect()
    }

    /// Resolves the props and runs one action. Unknown actions return `Ok(None)`.
    pub async fn run_action(
        &self,
        action: &AlsoInvocation,
        ctx: &RequestContext,
    ) -> Result<Option<Value>, ActionError> {
        let props = mask_object(&action.props, &action_mask(ctx))?;

        match action.kind() {
            AlsoActionKind::Log => {
                if props.is_null() {
                    return Err(ActionError::MissingProps);
                }
                debug!(target: "trafficlight::also", props = %props, "also log");
                Ok(Some(props))
            }
            AlsoActionKind::HttpCall => self.http_call(&props).await.map(Some),
            AlsoActionKind::Unknown(name) => {
                debug!(action = %name, "unknown action, skipping");
                Ok(None)
            }
        }
    }

    async fn http_call(&self, props: &Value) -> Result<Value, ActionError> {
        let url = props
            .get("url")
            .and_then(Value::as_str)
            .ok_or(ActionError::MissingUrl)?;
        let method_name = props
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ActionError::InvalidMethod(method_name.clone()))?;
        let timeout = props
            .get("timeout")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .map(|requested| requested.min(self.timeout_cap))
            .unwrap_or(self.timeout_cap);

        let mut builder = self.client.request(method, url).timeout(timeout);
        if let Some(Value::Object(headers)) = props.get("headers") {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), scalar_to_string(value));
            }
        }
        if let Some(Value::Object(params)) = props.get("params") {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(key, value)| (key.clone(), scalar_to_string(value)))
                .collect();
            builder = builder.query(&pairs);
        }
        if let Some(data) = props.get("data").filter(|data| !data.is_null()) {
            builder = builder.json(data);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        debug!(%url, status, "httpCall completed");

        Ok(json!({"status": status, "data": data}))
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner() -> SideEffectRunner {
        SideEffectRunner::new(reqwest::Client::new(), Duration::from_secs(5))
    }

    fn ctx() -> RequestContext {
        RequestContext::builder("GET", "/router/x?user_id=42")
            .header("X-Token", "abc")
            .build()
    }

    #[tokio::test]
    async fn log_action_resolves_templates() {
        let action = AlsoInvocation::new(
            "log",
            json!({"user": "$get.userId", "headers": "$headers"}),
        );
        let props = runner().run_action(&action, &ctx()).await.unwrap().unwrap();
        assert_eq!(props["user"], "42");
        assert_eq!(props["headers"]["x-token"], "abc");
    }

    #[tokio::test]
    async fn log_without_props_is_an_error() {
        let action = AlsoInvocation::new("log", Value::Null);
        let err = runner().run_action(&action, &ctx()).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingProps));
    }

    #[tokio::test]
    async fn unknown_actions_are_noops() {
        let action = AlsoInvocation::new("sendmail", json!({"to": "x"}));
        assert!(runner().run_action(&action, &ctx()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn http_call_uses_props() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(query_param("user", "42"))
            .and(header("x-forwarded-token", "abc"))
            .and(body_json(json!({"router": "x"})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"queued": true})))
            .expect(1)
            .mount(&server)
            .await;

        let action = AlsoInvocation::new(
            "axios",
            json!({
                "url": format!("{}/hook", server.uri()),
                "method": "post",
                "headers": {"x-forwarded-token": "abc"},
                "params": {"user": "$get.userId"},
                "data": {"router": "x"},
                "timeout": 2000
            }),
        );
        let result = runner().run_action(&action, &ctx()).await.unwrap().unwrap();
        assert_eq!(result["status"], 202);
        assert_eq!(result["data"]["queued"], true);
    }

    #[tokio::test]
    async fn http_call_requires_url() {
        let action = AlsoInvocation::new("httpCall", json!({"method": "GET"}));
        let err = runner().run_action(&action, &ctx()).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingUrl));
    }

    #[tokio::test]
    async fn spawned_failures_do_not_propagate() {
        let actions = vec![
            AlsoInvocation::new("httpCall", json!({"url": "http://127.0.0.1:1/unreachable", "timeout": 200})),
            AlsoInvocation::new("", json!({})),
            AlsoInvocation::new("log", json!({"ok": true})),
        ];
        let handles = runner().spawn_all("x", &actions, &ctx());
        assert_eq!(handles.len(), 2, "entries without a name are skipped");
        for handle in handles {
            handle.await.expect("task must not panic");
        }
    }
}
