use std::sync::{Arc, OnceLock};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::error;

use crate::error::ApiError;
use crate::session::{InboundObserver, Session};
use crate::types::{HealthResponse, InboundMessage, SendRequest, SendResponse, WebhookEvent};

pub struct AppState {
    /// Written exactly once, before the listener binds. The empty case is a
    /// defensive branch surfaced as a "not ready" response.
    pub session: OnceLock<Arc<dyn Session>>,
    pub observer: Arc<dyn InboundObserver>,
}

impl AppState {
    pub fn ready(session: Arc<dyn Session>, observer: Arc<dyn InboundObserver>) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(session);
        Self {
            session: slot,
            observer,
        }
    }
}

// Personal chats only; group recipients (@g.us) are out of scope.
fn format_recipient(number: &str) -> String {
    format!("{}@c.us", number)
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let number = req
        .number
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::InvalidInput)?;
    let message = req
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .ok_or(ApiError::InvalidInput)?;

    let session = state.session.get().ok_or(ApiError::NotReady)?;

    let recipient = format_recipient(number);
    match session.send_text(&recipient, message).await {
        Ok(response) => Ok((StatusCode::OK, Json(SendResponse::new(response)))),
        Err(err) => {
            error!("Error when sending: {}", err);
            Err(ApiError::SendFailure(err.0))
        }
    }
}

pub async fn inbound_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<WebhookEvent>,
) -> StatusCode {
    if event.event == "onmessage" {
        if let (Some(from), Some(body)) = (event.from, event.body) {
            state.observer.on_message(&InboundMessage { from, body });
        }
    }
    StatusCode::OK
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = if state.session.get().is_some() {
        "ok"
    } else {
        "starting"
    };
    Json(HealthResponse {
        status: status.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::response::Response;
    use serde_json::{json, Value};

    use super::*;
    use crate::session::{LogObserver, SendError};

    struct FakeSession {
        outcome: Result<Value, Value>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeSession {
        fn new(outcome: Result<Value, Value>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn send_text(&self, recipient: &str, message: &str) -> Result<Value, SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.to_string()));
            match &self.outcome {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(SendError(e.clone())),
            }
        }
    }

    fn ready_state(fake: Arc<FakeSession>) -> Arc<AppState> {
        Arc::new(AppState::ready(fake, Arc::new(LogObserver)))
    }

    fn not_ready_state() -> Arc<AppState> {
        Arc::new(AppState {
            session: OnceLock::new(),
            observer: Arc::new(LogObserver),
        })
    }

    fn request(number: Option<&str>, message: Option<&str>) -> SendRequest {
        SendRequest {
            number: number.map(str::to_string),
            message: message.map(str::to_string),
        }
    }

    async fn call(state: Arc<AppState>, req: SendRequest) -> Response {
        match send_message(State(state), Json(req)).await {
            Ok(resp) => resp.into_response(),
            Err(err) => err.into_response(),
        }
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_number_is_bad_request() {
        let state = ready_state(FakeSession::new(Ok(json!({"id": "abc"}))));
        let resp = call(state, request(None, Some("hi"))).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({
                "status": "error",
                "message": "Missing \"number\" or \"message\" in request body"
            })
        );
    }

    #[tokio::test]
    async fn missing_message_is_bad_request() {
        let state = ready_state(FakeSession::new(Ok(json!({"id": "abc"}))));
        let resp = call(state, request(Some("5511999999999"), None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_fields_are_bad_request() {
        let state = ready_state(FakeSession::new(Ok(json!({"id": "abc"}))));
        let resp = call(state, request(Some(""), Some("hi"))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_fields_rejected_even_when_not_ready() {
        let resp = call(not_ready_state(), request(None, None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn well_formed_request_without_session_is_not_ready() {
        let resp = call(not_ready_state(), request(Some("5511999999999"), Some("hi"))).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            json!({
                "status": "error",
                "message": "WhatsApp client is not ready"
            })
        );
    }

    #[tokio::test]
    async fn successful_send_passes_result_through() {
        let fake = FakeSession::new(Ok(json!({"id": "abc"})));
        let resp = call(
            ready_state(fake.clone()),
            request(Some("5511999999999"), Some("hi")),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({
                "status": "success",
                "response": {"id": "abc"}
            })
        );

        let sent = fake.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![("5511999999999@c.us".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_send_passes_error_through() {
        let fake = FakeSession::new(Err(json!({"code": "transport"})));
        let resp = call(
            ready_state(fake),
            request(Some("5511999999999"), Some("hi")),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            json!({
                "status": "error",
                "message": "Error sending message",
                "error": {"code": "transport"}
            })
        );
    }

    #[test]
    fn recipient_gets_personal_chat_suffix() {
        assert_eq!(format_recipient("5511999999999"), "5511999999999@c.us");
    }

    #[tokio::test]
    async fn webhook_message_event_reaches_observer() {
        struct Capture(Mutex<Vec<(String, String)>>);
        impl InboundObserver for Capture {
            fn on_message(&self, msg: &InboundMessage) {
                self.0
                    .lock()
                    .unwrap()
                    .push((msg.from.clone(), msg.body.clone()));
            }
        }

        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        let state = Arc::new(AppState {
            session: OnceLock::new(),
            observer: capture.clone(),
        });

        let event = WebhookEvent {
            event: "onmessage".to_string(),
            from: Some("5511999999999@c.us".to_string()),
            body: Some("hello".to_string()),
        };
        let code = inbound_webhook(State(state.clone()), Json(event)).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(
            *capture.0.lock().unwrap(),
            vec![("5511999999999@c.us".to_string(), "hello".to_string())]
        );

        // non-message events are ignored
        let event = WebhookEvent {
            event: "onack".to_string(),
            from: None,
            body: None,
        };
        inbound_webhook(State(state), Json(event)).await;
        assert_eq!(capture.0.lock().unwrap().len(), 1);
    }
}
