//! # Interactive Components Server
//!
//! HTTP endpoint receiving Slack interaction callbacks (button clicks).
//! The server is constructed once by the runtime and started lazily on first
//! activation; later activations reuse the running instance.

use anyhow::{Context, Result, anyhow};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, mpsc};
use tracing::{error, info, warn};

use crate::domain::types::{Button, Message, message_timestamp};
use crate::infrastructure::slack::events::{forward, message_type_for};
use crate::infrastructure::slack::{is_valid_path, signature};

pub const HEALTH_PATH: &str = "/interaction_health";

/// Whether `path` may be used as the interactions callback route.
pub fn is_valid_callback_path(path: &str) -> bool {
    is_valid_path(path) && path != HEALTH_PATH
}

#[derive(Debug, Clone)]
pub struct InteractionSettings {
    /// The bot's interactive components flag.
    pub enabled: bool,
    pub signing_secret: String,
    pub callback_path: String,
    pub bind_addr: SocketAddr,
}

pub struct InteractionServer {
    settings: InteractionSettings,
    started: OnceCell<SocketAddr>,
}

struct CallbackState {
    signing_secret: String,
    inbound: mpsc::Sender<Message>,
}

impl InteractionServer {
    pub fn new(settings: InteractionSettings) -> Self {
        Self {
            settings,
            started: OnceCell::new(),
        }
    }

    /// Address of the running server, if it has been started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.started.get().copied()
    }

    /// Start the server if needed. Returns `None` when interactions are disabled
    /// or misconfigured; the bot keeps running either way.
    pub async fn activate(&self, inbound: mpsc::Sender<Message>) -> Option<SocketAddr> {
        if !self.settings.enabled || self.settings.signing_secret.is_empty() {
            return None;
        }
        if let Some(addr) = self.started.get() {
            return Some(*addr);
        }

        let path = &self.settings.callback_path;
        if path.is_empty() {
            error!(
                "need to specify a callback path for 'interactions_callback_path' (e.g. \"/slack_events/v1/mybot_dev-v1_interactions\")"
            );
            warn!("closing interactions reader (will not be able to read interactive components)");
            return None;
        }
        if !is_valid_callback_path(path) {
            error!(
                "invalid interactions path '{}' - please double check your path value/syntax (e.g. \"/slack_events/v1/mybot_dev-v1_interactions\")",
                path
            );
            warn!("closing interactions reader (will not be able to read interactive components)");
            return None;
        }

        match self.started.get_or_try_init(|| self.start(inbound)).await {
            Ok(addr) => Some(*addr),
            Err(e) => {
                error!("could not start interactive components server: {:#}", e);
                None
            }
        }
    }

    async fn start(&self, inbound: mpsc::Sender<Message>) -> Result<SocketAddr> {
        let app = router(
            &self.settings.callback_path,
            &self.settings.signing_secret,
            inbound,
        );
        let listener = tokio::net::TcpListener::bind(self.settings.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.settings.bind_addr))?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("interactive components server stopped: {}", e);
            }
        });
        info!(
            "slack interactive components server is listening on {} at '{}'",
            addr, self.settings.callback_path
        );
        Ok(addr)
    }
}

fn router(path: &str, signing_secret: &str, inbound: mpsc::Sender<Message>) -> Router {
    let state = Arc::new(CallbackState {
        signing_secret: signing_secret.to_string(),
        inbound,
    });
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(path, post(handle_callback))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) =
        signature::verify_request(&state.signing_secret, &headers, &body, message_timestamp())
    {
        warn!("rejected interaction request: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload = match form_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("could not read interaction payload: {:#}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match decode_interaction(payload) {
        Ok(message) => {
            info!(
                "received interaction '{}' from {}",
                message.input, message.user_id
            );
            forward(&state.inbound, message).await;
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!("could not decode interaction: {:#}", e);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Pull the JSON `payload` field out of a form-encoded body.
fn form_payload(body: &[u8]) -> Result<Value> {
    let mut form: HashMap<String, String> =
        serde_urlencoded::from_bytes(body).context("Body is not a valid form")?;
    let raw = form
        .remove("payload")
        .ok_or_else(|| anyhow!("Missing 'payload' field"))?;
    serde_json::from_str(&raw).context("Payload is not JSON")
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<IdOnly>,
    #[serde(default)]
    channel: Option<IdOnly>,
    #[serde(default)]
    container: Option<Container>,
    #[serde(default)]
    message: Option<PayloadMessage>,
    #[serde(default)]
    actions: Vec<PayloadAction>,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(default)]
    message_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadAction {
    #[serde(default)]
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

/// Turn a `block_actions` payload into a message whose input is the clicked value.
pub fn decode_interaction(payload: Value) -> Result<Message> {
    let payload: InteractionPayload =
        serde_json::from_value(payload).context("Unexpected interaction payload")?;
    if payload.kind != "block_actions" {
        return Err(anyhow!("Unsupported interaction type '{}'", payload.kind));
    }
    let channel = payload
        .channel
        .map(|c| c.id)
        .ok_or_else(|| anyhow!("Interaction has no channel"))?;
    let user = payload.user.map(|u| u.id).unwrap_or_default();
    let action = payload
        .actions
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Interaction has no actions"))?;
    let ts = payload
        .container
        .and_then(|c| c.message_ts)
        .or_else(|| payload.message.as_ref().and_then(|m| m.ts.clone()))
        .unwrap_or_default();

    let mut message = Message::new(message_type_for(None, &channel), &channel, &ts);
    message.user_id = user.clone();
    message.input = action.value.clone().unwrap_or_default();
    message.thread_timestamp = payload.message.and_then(|m| m.thread_ts);
    message.vars.insert("_user.id".to_string(), user);
    message.vars.insert("_channel.id".to_string(), channel);
    message.vars.insert("_message.ts".to_string(), ts);
    message
        .vars
        .insert("_interaction.action_id".to_string(), action.action_id);
    message.vars.insert(
        "_interaction.value".to_string(),
        action.value.unwrap_or_default(),
    );
    if let Some(url) = payload.response_url {
        message
            .vars
            .insert("_interaction.response_url".to_string(), url);
    }
    Ok(message)
}

/// Block Kit layout for an interactive message: the text plus one button per entry.
pub fn build_blocks(text: &str, buttons: &[Button]) -> Value {
    let elements: Vec<Value> = buttons
        .iter()
        .enumerate()
        .map(|(i, button)| {
            json!({
                "type": "button",
                "action_id": format!("button_{i}"),
                "text": { "type": "plain_text", "text": button.text },
                "value": button.value,
            })
        })
        .collect();
    json!([
        { "type": "section", "text": { "type": "mrkdwn", "text": text } },
        { "type": "actions", "elements": elements },
    ])
}
