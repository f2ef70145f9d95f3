use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use log::{debug, info};
use qrcode::render::unicode;
use qrcode::QrCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::InboundMessage;

/// Opaque failure from the send capability. The payload is whatever the
/// gateway returned (its JSON error body, or a transport error message) and
/// is passed through to the HTTP caller verbatim.
#[derive(Debug)]
pub struct SendError(pub Value);

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SendError {}

/// Send capability of an established session. The handler only ever sees
/// this seam, so tests can substitute a fake.
#[async_trait]
pub trait Session: Send + Sync {
    /// Sends a text to a network-addressable recipient (`<number>@c.us`).
    /// Resolves once the gateway has accepted the message for transport;
    /// this is not an end-to-end delivery confirmation.
    async fn send_text(&self, recipient: &str, message: &str) -> Result<Value, SendError>;
}

/// Inbound-message subscription. The default observer just logs; a webhook
/// forwarder could be dropped in here without touching the session gate.
pub trait InboundObserver: Send + Sync {
    fn on_message(&self, msg: &InboundMessage);
}

pub struct LogObserver;

impl InboundObserver for LogObserver {
    fn on_message(&self, msg: &InboundMessage) {
        info!("Received message from {}: {}", msg.from, msg.body);
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub session_id: String,
    pub token: Option<String>,
}

/// Session handle backed by a WPPConnect HTTP gateway. The gateway owns QR
/// generation, pairing, and the WhatsApp transport; this client only starts
/// the session, polls its status, and forwards sends.
pub struct GatewaySession {
    http: reqwest::Client,
    config: GatewayConfig,
}

/// `GET status-session` response. `urlcode` is the raw QR payload, present
/// while the gateway is waiting for a scan.
#[derive(Deserialize)]
struct SessionStatus {
    status: String,
    #[serde(default)]
    urlcode: Option<String>,
}

const POLL_INTERVAL: Duration = Duration::from_secs(2);

impl GatewaySession {
    fn url(&self, op: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.session_id,
            op
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn start_session(&self) -> anyhow::Result<()> {
        let resp = self
            .authorize(self.http.post(self.url("start-session")))
            .json(&json!({ "waitQrCode": false }))
            .send()
            .await
            .context("gateway unreachable")?;
        if !resp.status().is_success() {
            bail!("start-session returned {}", resp.status());
        }
        Ok(())
    }

    async fn status(&self) -> anyhow::Result<SessionStatus> {
        let resp = self
            .authorize(self.http.get(self.url("status-session")))
            .send()
            .await
            .context("gateway unreachable")?;
        if !resp.status().is_success() {
            bail!("status-session returned {}", resp.status());
        }
        resp.json().await.context("malformed status-session body")
    }
}

#[async_trait]
impl Session for GatewaySession {
    async fn send_text(&self, recipient: &str, message: &str) -> Result<Value, SendError> {
        let resp = self
            .authorize(self.http.post(self.url("send-message")))
            .json(&json!({ "phone": recipient, "message": message }))
            .send()
            .await
            .map_err(|e| SendError(json!({ "message": e.to_string() })))?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body)
        } else {
            Err(SendError(body))
        }
    }
}

/// Establishes exactly one gateway session and suspends until it is paired
/// and connected. `on_qr` receives the raw QR payload each time the gateway
/// rotates it; `on_status` fires once per status transition. Any gateway
/// error or terminal session status is returned as an error so startup can
/// abort instead of hanging without a server.
pub async fn establish(
    config: GatewayConfig,
    mut on_qr: impl FnMut(&str),
    mut on_status: impl FnMut(&str),
) -> anyhow::Result<Arc<GatewaySession>> {
    let session = GatewaySession {
        http: reqwest::Client::new(),
        config,
    };

    session.start_session().await?;

    let mut last_status = String::new();
    let mut last_qr: Option<String> = None;
    loop {
        let current = session.status().await?;

        if current.status != last_status {
            on_status(&current.status);
            last_status = current.status.clone();
        }
        if let Some(code) = &current.urlcode {
            if last_qr.as_deref() != Some(code) {
                on_qr(code);
                last_qr = Some(code.clone());
            }
        }

        match current.status.as_str() {
            "CONNECTED" | "isLogged" | "inChat" => {
                debug!("session {} ready", session.config.session_id);
                return Ok(Arc::new(session));
            }
            "CLOSED" | "DISCONNECTED" | "browserClose" | "autocloseCalled" => {
                bail!("session closed before pairing completed ({})", current.status);
            }
            _ => {}
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Renders a QR payload as a terminal-scannable unicode block grid. Returns
/// None if the payload does not fit a QR code, in which case the caller
/// should log the raw payload instead.
pub fn render_qr(payload: &str) -> Option<String> {
    let code = QrCode::new(payload.as_bytes()).ok()?;
    Some(
        code.render::<unicode::Dense1x2>()
            .quiet_zone(true)
            .build(),
    )
}
