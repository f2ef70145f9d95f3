use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::types::ErrorBody;

/// Everything the send endpoint can surface to a caller.
pub enum ApiError {
    /// No session handle has been stored yet. Normally unreachable because
    /// the listener only binds after the session is established.
    NotReady,
    /// `number` or `message` missing or empty.
    InvalidInput,
    /// The gateway rejected the send; carries the gateway's error verbatim.
    SendFailure(Value),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, body) = match self {
            ApiError::NotReady => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("WhatsApp client is not ready"),
            ),
            ApiError::InvalidInput => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("Missing \"number\" or \"message\" in request body"),
            ),
            ApiError::SendFailure(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::with_error("Error sending message", error),
            ),
        };

        (code, Json(body)).into_response()
    }
}
