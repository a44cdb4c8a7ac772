//! # Slack Events
//!
//! Translation of Slack message events into bot `Message`s, and the
//! events-API (callback mode) HTTP endpoint.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::bot::BotContext;
use crate::domain::types::{Message, MessageType, message_timestamp};
use crate::infrastructure::slack::signature;

/// The subset of a Slack `message` / `app_mention` event the bot uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// Outer events-API request body.
#[derive(Debug, Deserialize)]
struct EventRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<serde_json::Value>,
}

/// Map Slack's `channel_type` (or the channel id prefix) onto a message type.
pub fn message_type_for(channel_type: Option<&str>, channel_id: &str) -> MessageType {
    match channel_type {
        Some("im") => MessageType::Direct,
        Some("channel") => MessageType::Channel,
        Some("group") | Some("mpim") => MessageType::PrivateChannel,
        _ => match channel_id.chars().next() {
            Some('D') => MessageType::Direct,
            Some('G') => MessageType::PrivateChannel,
            Some('C') => MessageType::Channel,
            _ => MessageType::Unknown,
        },
    }
}

/// Build a `Message` from a raw event, or `None` when the event should be ignored
/// (edits, joins, other bots, the bot itself, non-message events).
pub fn translate_event(event: &MessageEvent, bot: &BotContext) -> Option<Message> {
    if event.kind != "message" && event.kind != "app_mention" {
        return None;
    }
    if event.subtype.is_some() || event.bot_id.is_some() {
        return None;
    }
    let user = event.user.as_deref()?;
    if user == bot.id() {
        return None;
    }
    let channel = event.channel.as_deref()?;
    let ts = event.ts.as_deref()?;

    let message_type = if event.kind == "app_mention" {
        message_type_for(None, channel)
    } else {
        message_type_for(event.channel_type.as_deref(), channel)
    };

    let mut message = Message::new(message_type, channel, ts);
    message.user_id = user.to_string();
    message.input = event.text.clone().unwrap_or_default();
    message.thread_timestamp = event.thread_ts.clone();
    message.channel_name = bot.room_name(channel).unwrap_or_default();
    message.start_time = message_timestamp();

    message.vars.insert("_user.id".to_string(), user.to_string());
    message.vars.insert("_channel.id".to_string(), channel.to_string());
    message
        .vars
        .insert("_channel.name".to_string(), message.channel_name.clone());
    message.vars.insert("_message.ts".to_string(), ts.to_string());
    Some(message)
}

/// Parse and translate a raw JSON event.
pub fn translate_value(event: serde_json::Value, bot: &BotContext) -> Option<Message> {
    match serde_json::from_value::<MessageEvent>(event) {
        Ok(event) => translate_event(&event, bot),
        Err(e) => {
            debug!("ignoring unparseable slack event: {}", e);
            None
        }
    }
}

/// Push a message onto the inbound channel, waiting for capacity.
/// Returns false once the consumer is gone.
pub async fn forward(inbound: &mpsc::Sender<Message>, message: Message) -> bool {
    debug!("forwarding message '{}' from {}", message.id, message.channel_id);
    if inbound.send(message).await.is_err() {
        warn!("inbound message channel closed - dropping slack event");
        return false;
    }
    true
}

struct EventsState {
    signing_secret: String,
    inbound: mpsc::Sender<Message>,
    bot: Arc<BotContext>,
}

/// Router for the events-API callback path.
pub fn router(
    path: &str,
    signing_secret: &str,
    inbound: mpsc::Sender<Message>,
    bot: Arc<BotContext>,
) -> Router {
    let state = Arc::new(EventsState {
        signing_secret: signing_secret.to_string(),
        inbound,
        bot,
    });
    Router::new()
        .route(path, post(handle_event))
        .with_state(state)
}

/// Serve the events API until the listener fails.
pub async fn serve(
    port: u16,
    path: &str,
    signing_secret: &str,
    inbound: mpsc::Sender<Message>,
    bot: Arc<BotContext>,
) -> Result<()> {
    let app = router(path, signing_secret, inbound, bot);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind events listener on port {port}"))?;
    info!("slack events api listening on port {} at '{}'", port, path);
    axum::serve(listener, app)
        .await
        .context("Slack events server stopped")
}

async fn handle_event(
    State(state): State<Arc<EventsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = signature::verify_request(
        &state.signing_secret,
        &headers,
        &body,
        message_timestamp(),
    ) {
        warn!("rejected slack event request: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let request: EventRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("could not parse slack event request: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match request.kind.as_str() {
        "url_verification" => request.challenge.unwrap_or_default().into_response(),
        "event_callback" => {
            if let Some(message) = request
                .event
                .and_then(|event| translate_value(event, &state.bot))
            {
                forward(&state.inbound, message).await;
            }
            StatusCode::OK.into_response()
        }
        other => {
            debug!("ignoring slack request type '{}'", other);
            StatusCode::OK.into_response()
        }
    }
}
