use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /send-message`. Fields are optional so that missing keys
/// reach the handler's own validation instead of a deserialization rejection.
#[derive(Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub status: &'static str,
    pub response: Value,
}

impl SendResponse {
    pub fn new(response: Value) -> Self {
        Self {
            status: "success",
            response,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ErrorBody {
    pub fn new(message: &'static str) -> Self {
        Self {
            status: "error",
            message,
            error: None,
        }
    }

    pub fn with_error(message: &'static str, error: Value) -> Self {
        Self {
            status: "error",
            message,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// One inbound message as delivered to observers.
#[derive(Debug)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

/// Gateway webhook payload. Only `onmessage` events carry `from`/`body`;
/// everything else is ignored.
#[derive(Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}
