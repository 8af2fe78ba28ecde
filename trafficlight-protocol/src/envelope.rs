use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status block of the JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeStatus {
    pub is_ok: bool,
    pub code: u16,
}

/// `{response: {isOk, code}, data, error}` body used by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub response: EnvelopeStatus,
    pub data: Value,
    pub error: Value,
}

impl ApiEnvelope {
    pub fn error(code: u16, error: impl Into<Value>) -> Self {
        Self {
            response: EnvelopeStatus { is_ok: false, code },
            data: Value::Null,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_envelope_shape() {
        let value = serde_json::to_value(ApiEnvelope::error(404, "resource not found")).unwrap();
        assert_eq!(
            value,
            json!({
                "response": {"isOk": false, "code": 404},
                "data": null,
                "error": "resource not found"
            })
        );
    }
}
