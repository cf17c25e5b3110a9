//! LINE channel. Receives Messaging API webhooks and answers with the reply API.
//!
//! The webhook handler checks the `x-line-signature` header against the raw
//! body, acknowledges immediately, and pushes text events into the channel's
//! stream. Replies go out through `POST /v2/bot/message/reply` using the reply
//! token carried in the message metadata.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::stream;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::LineConfig;
use crate::error::ChannelError;
use crate::triage::prompts::NON_TEXT_REPLY;

pub const DEFAULT_API_BASE: &str = "https://api.line.me";

/// Header carrying the base64 HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Maximum characters in one LINE text message.
const LINE_MAX_MESSAGE_LENGTH: usize = 5000;

/// Maximum message objects in one reply call.
const LINE_MAX_MESSAGES_PER_REPLY: usize = 5;

const CHANNEL_NAME: &str = "line";

// ── Webhook payload ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<EventSource>,
    #[serde(default)]
    message: Option<EventMessage>,
    #[serde(default)]
    delivery_context: Option<DeliveryContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
}

impl EventSource {
    /// Groups and rooms share one session; one-to-one chats use the user id.
    fn conversation_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.room_id.as_deref())
            .or(self.user_id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryContext {
    #[serde(default)]
    is_redelivery: bool,
}

/// What the webhook handler does with one event.
#[derive(Debug)]
enum EventAction {
    Text(IncomingMessage),
    NonText { reply_token: String },
    Ignore(&'static str),
}

fn classify_event(event: WebhookEvent) -> EventAction {
    if event.kind != "message" {
        return EventAction::Ignore("not a message event");
    }
    if event.delivery_context.is_some_and(|d| d.is_redelivery) {
        return EventAction::Ignore("redelivered event");
    }
    let Some(reply_token) = event.reply_token else {
        return EventAction::Ignore("no reply token");
    };
    let Some(message) = event.message else {
        return EventAction::Ignore("no message body");
    };

    if message.kind != "text" {
        return EventAction::NonText { reply_token };
    }
    let Some(text) = message.text else {
        return EventAction::NonText { reply_token };
    };
    let Some(conversation) = event.source.as_ref().and_then(EventSource::conversation_id) else {
        return EventAction::Ignore("no source id");
    };

    let user_id = event.source.as_ref().and_then(|s| s.user_id.clone());
    let incoming = IncomingMessage::new(CHANNEL_NAME, conversation, &text).with_metadata(
        serde_json::json!({
            "reply_token": reply_token,
            "user_id": user_id,
        }),
    );
    EventAction::Text(incoming)
}

// ── Signature ───────────────────────────────────────────────────────────

/// Check a webhook signature: base64(HMAC-SHA256(channel_secret, body)).
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature LINE would send for `body`.
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

// ── Shared state ────────────────────────────────────────────────────────

struct LineInner {
    channel_secret: SecretString,
    access_token: SecretString,
    api_base: String,
    client: reqwest::Client,
    incoming_tx: mpsc::UnboundedSender<IncomingMessage>,
}

impl LineInner {
    fn reply_url(&self) -> String {
        format!("{}/v2/bot/message/reply", self.api_base)
    }

    /// Reply with `text`, split to fit LINE's message limits.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
        let mut chunks = split_message(text, LINE_MAX_MESSAGE_LENGTH);
        if chunks.len() > LINE_MAX_MESSAGES_PER_REPLY {
            warn!(
                chunks = chunks.len(),
                "LINE reply exceeds {LINE_MAX_MESSAGES_PER_REPLY} messages; truncating"
            );
            chunks.truncate(LINE_MAX_MESSAGES_PER_REPLY);
        }

        let messages: Vec<serde_json::Value> = chunks
            .iter()
            .map(|c| serde_json::json!({"type": "text", "text": c}))
            .collect();
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": messages,
        });

        let resp = self
            .client
            .post(self.reply_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("reply returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

#[derive(Clone)]
struct WebhookState {
    inner: Arc<LineInner>,
}

// ── LineChannel ─────────────────────────────────────────────────────────

pub struct LineChannel {
    inner: Arc<LineInner>,
    /// Consumed once in `start()`.
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<IncomingMessage>>>,
}

impl LineChannel {
    pub fn new(config: LineConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(LineInner {
            channel_secret: config.channel_secret,
            access_token: config.access_token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            incoming_tx,
        });

        Self {
            inner,
            incoming_rx: Mutex::new(Some(incoming_rx)),
        }
    }

    /// Axum routes for the webhook. `/webhook` and `/callback` share one
    /// handler.
    pub fn router(&self) -> Router {
        let state = WebhookState {
            inner: Arc::clone(&self.inner),
        };

        Router::new()
            .route("/webhook", post(webhook_handler))
            .route("/callback", post(webhook_handler))
            .with_state(state)
    }
}

#[async_trait]
impl Channel for LineChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let rx = self
            .incoming_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::StartupFailed {
                name: CHANNEL_NAME.to_string(),
                reason: "start() already called".to_string(),
            })?;

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let reply_token = msg
            .metadata
            .get("reply_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: "No reply_token in message metadata".into(),
            })?;

        self.inner.reply(reply_token, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .inner
            .client
            .get(format!("{}/v2/bot/info", self.inner.api_base))
            .bearer_auth(self.inner.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::AuthFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("bot info returned {}", resp.status()),
            })
        }
    }
}

// ── HTTP handlers ───────────────────────────────────────────────────────

/// `GET /` liveness route, served whether or not LINE is configured.
pub fn index_router() -> Router {
    Router::new().route("/", get(root))
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({"title": "Line Bot"}))
}

async fn webhook_handler(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(state.inner.channel_secret.expose_secret(), &body, signature) {
        warn!("LINE webhook rejected: invalid signature");
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let payload: WebhookBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "LINE webhook rejected: malformed body");
            return (StatusCode::BAD_REQUEST, "Malformed body");
        }
    };

    for event in payload.events {
        match classify_event(event) {
            EventAction::Text(msg) => {
                debug!(user = %msg.user_id, "LINE text message received");
                if state.inner.incoming_tx.send(msg).is_err() {
                    warn!("LINE incoming channel closed");
                }
            }
            EventAction::NonText { reply_token } => {
                let inner = Arc::clone(&state.inner);
                tokio::spawn(async move {
                    if let Err(e) = inner.reply(&reply_token, NON_TEXT_REPLY).await {
                        warn!(error = %e, "LINE non-text reply failed");
                    }
                });
            }
            EventAction::Ignore(reason) => debug!(reason, "LINE event ignored"),
        }
    }

    info!("LINE webhook accepted");
    (StatusCode::OK, "OK")
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Split a message into chunks of at most `max_chars` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((cut, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..cut];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
