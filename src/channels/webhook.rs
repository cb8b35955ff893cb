//! Messenger webhook: payload parsing and HTTP routes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Free text, trimmed.
    Text(String),
    /// Tapped quick reply; payload trimmed and lower-cased.
    QuickReply(String),
    /// Tapped persistent-menu or template button; payload trimmed and lower-cased.
    Postback(String),
    /// Delivery/read receipts and echoes of our own messages.
    Receipt,
    /// Attachments, stickers, reactions and anything else without text.
    Unsupported,
}

impl EventKind {
    /// Text or payload to feed the conversation, if any.
    pub fn input(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::QuickReply(s) | Self::Postback(s) => Some(s),
            Self::Receipt | Self::Unsupported => None,
        }
    }
}

/// One actionable entry from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Page-scoped user ID of the sender.
    pub external_id: String,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn text(external_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            kind: EventKind::Text(text.into()),
        }
    }
}

/// Consumer of parsed webhook events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. Never fails: errors are answered or logged inside.
    async fn handle_event(&self, event: InboundEvent);
}

// ── Payload ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub messaging: Vec<MessagingItem>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingItem {
    pub sender: Option<Party>,
    pub message: Option<MessageBody>,
    pub postback: Option<PayloadBody>,
    pub delivery: Option<serde_json::Value>,
    pub read: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub text: Option<String>,
    pub quick_reply: Option<PayloadBody>,
    #[serde(default)]
    pub is_echo: bool,
}

#[derive(Debug, Deserialize)]
pub struct PayloadBody {
    #[serde(default)]
    pub payload: String,
}

/// Flatten `entry[].messaging[]` into events. Items without a sender are dropped.
pub fn parse_events(payload: &WebhookPayload) -> Vec<InboundEvent> {
    payload
        .entry
        .iter()
        .flat_map(|entry| entry.messaging.iter())
        .filter_map(|item| {
            let Some(sender) = &item.sender else {
                warn!("Webhook item without sender ignored");
                return None;
            };
            Some(InboundEvent {
                external_id: sender.id.clone(),
                kind: classify(item),
            })
        })
        .collect()
}

fn classify(item: &MessagingItem) -> EventKind {
    if let Some(message) = &item.message {
        if message.is_echo {
            return EventKind::Receipt;
        }
        if let Some(quick_reply) = &message.quick_reply {
            return EventKind::QuickReply(normalize_payload(&quick_reply.payload));
        }
        return match message.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => EventKind::Text(text.to_string()),
            _ => EventKind::Unsupported,
        };
    }
    if let Some(postback) = &item.postback {
        return EventKind::Postback(normalize_payload(&postback.payload));
    }
    if item.delivery.is_some() || item.read.is_some() {
        return EventKind::Receipt;
    }
    EventKind::Unsupported
}

fn normalize_payload(payload: &str) -> String {
    payload.trim().to_lowercase()
}

// ── Routes ──────────────────────────────────────────────────────────

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub handler: Arc<dyn EventHandler>,
    pub verify_token: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook
///
/// Subscription handshake: echo `hub.challenge` when the token matches.
async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let Some(expected) = &state.verify_token else {
        warn!("Webhook verification attempted but VERIFY_TOKEN is not set");
        return (StatusCode::FORBIDDEN, String::new());
    };

    let token_ok = params.verify_token.as_deref() == Some(expected.expose_secret());
    match (params.mode.as_deref(), params.challenge) {
        (Some("subscribe"), Some(challenge)) if token_ok => {
            tracing::info!("Webhook verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            warn!("Webhook verification failed");
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// POST /webhook
///
/// Handles every event in order, then acknowledges.
async fn receive(
    State(state): State<WebhookState>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    if payload.object != "page" {
        debug!(object = %payload.object, "Ignoring non-page webhook");
        return StatusCode::NOT_FOUND;
    }

    for event in parse_events(&payload) {
        state.handler.handle_event(event).await;
    }
    StatusCode::OK
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Build the webhook and health routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<InboundEvent>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: InboundEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn payload(json: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json).unwrap()
    }

    fn app(recorder: Arc<Recorder>, token: Option<&str>) -> Router {
        webhook_routes(WebhookState {
            handler: recorder,
            verify_token: token.map(|t| SecretString::from(t.to_string())),
        })
    }

    // ── parse_events ────────────────────────────────────────────────

    #[test]
    fn parses_every_kind() {
        let p = payload(serde_json::json!({
            "object": "page",
            "entry": [{
                "messaging": [
                    {"sender": {"id": "u1"}, "message": {"mid": "m1", "text": "  Hello there "}},
                    {"sender": {"id": "u1"}, "message": {"text": "English", "quick_reply": {"payload": " 1 "}}},
                    {"sender": {"id": "u2"}, "postback": {"title": "Start", "payload": "RESTART"}},
                    {"sender": {"id": "u2"}, "delivery": {"mids": ["m1"]}},
                    {"sender": {"id": "u2"}, "read": {"watermark": 1}},
                    {"sender": {"id": "u3"}, "message": {"attachments": [{"type": "image"}]}},
                    {"sender": {"id": "page"}, "message": {"text": "echo", "is_echo": true}}
                ]
            }]
        }));

        let kinds: Vec<_> = parse_events(&p).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Text("Hello there".into()),
                EventKind::QuickReply("1".into()),
                EventKind::Postback("restart".into()),
                EventKind::Receipt,
                EventKind::Receipt,
                EventKind::Unsupported,
                EventKind::Receipt,
            ]
        );
    }

    #[test]
    fn whitespace_only_text_is_unsupported() {
        let p = payload(serde_json::json!({
            "object": "page",
            "entry": [{"messaging": [{"sender": {"id": "u"}, "message": {"text": "   "}}]}]
        }));
        assert_eq!(parse_events(&p)[0].kind, EventKind::Unsupported);
    }

    #[test]
    fn items_without_sender_are_dropped() {
        let p = payload(serde_json::json!({
            "object": "page",
            "entry": [{"messaging": [{"message": {"text": "hi"}}]}, {}]
        }));
        assert!(parse_events(&p).is_empty());
    }

    #[test]
    fn event_input() {
        assert_eq!(EventKind::QuickReply("2".into()).input(), Some("2"));
        assert_eq!(EventKind::Receipt.input(), None);
    }

    // ── Routes ──────────────────────────────────────────────────────

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn verify_echoes_challenge() {
        let app = app(Arc::default(), Some("secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=secret&hub.challenge=12345")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "12345");
    }

    #[tokio::test]
    async fn verify_rejects_wrong_token() {
        let app = app(Arc::default(), Some("secret"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn verify_rejects_when_unconfigured() {
        let app = app(Arc::default(), None);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn post_dispatches_events_and_acks() {
        let recorder = Arc::new(Recorder::default());
        let body = serde_json::json!({
            "object": "page",
            "entry": [{"messaging": [
                {"sender": {"id": "u1"}, "message": {"text": "hi"}},
                {"sender": {"id": "u1"}, "delivery": {}}
            ]}]
        });
        let response = app(recorder.clone(), None)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], InboundEvent::text("u1", "hi"));
        assert_eq!(events[1].kind, EventKind::Receipt);
    }

    #[tokio::test]
    async fn post_ignores_other_objects() {
        let recorder = Arc::new(Recorder::default());
        let response = app(recorder.clone(), None)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"object":"instagram","entry":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app(Arc::default(), None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("ok"));
    }
}
