use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};
use trafficlight_protocol::envelope::ApiEnvelope;
use trafficlight_rules::RuleError;

use crate::dispatcher::DispatchError;

/// Request-level failure, rendered as the JSON envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Rule(RuleError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Rule(RuleError::NotFound(_)) => StatusCode::NOT_FOUND,
            GatewayError::Rule(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Dispatch(DispatchError::Proxy(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to clients. Never carries paths or upstream details.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Rule(RuleError::InvalidName(_)) => {
                "router name may only contain lowercase letters, '-' and '_'"
            }
            GatewayError::Rule(RuleError::NotFound(_)) => "router not found",
            GatewayError::Rule(RuleError::Invalid { .. } | RuleError::Parse { .. }) => {
                "router definition is invalid"
            }
            GatewayError::Rule(_) => "resource unavailable",
            GatewayError::Dispatch(DispatchError::ResourceUnavailable) => "resource unavailable",
            GatewayError::Dispatch(DispatchError::ResourceCorrupted(_)) => "resource corrupted",
            GatewayError::Dispatch(DispatchError::RedirectUnavailable) => {
                "redirect target unavailable"
            }
            GatewayError::Dispatch(DispatchError::Proxy(_)) => "proxy server error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let envelope = ApiEnvelope::error(status.as_u16(), self.public_message());
        (status, Json(envelope)).into_response()
    }
}
