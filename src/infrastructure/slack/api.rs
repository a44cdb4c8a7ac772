//! # Slack Web API Client
//!
//! Thin `reqwest` wrapper over the handful of Web API methods the bot needs.
//! Every Slack response is an `{ "ok": bool, "error": ... }` envelope.

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::error::RemoteError;

#[derive(Debug, Clone)]
pub struct SlackApi {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    ts: String,
}

impl SlackApi {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Resolve the bot's own user id.
    pub async fn auth_test(&self) -> Result<String, RemoteError> {
        if self.token.is_empty() {
            return Err(RemoteError::Authentication("no slack token configured".to_string()));
        }
        self.call::<AuthTest>("auth.test", &self.token, json!({}))
            .await
            .map(|r| r.user_id)
            .map_err(|e| match e {
                RemoteError::Transient(msg) => RemoteError::Authentication(msg),
                other => other,
            })
    }

    /// All channels the token can see, as name -> id.
    pub async fn conversations(&self) -> Result<HashMap<String, String>, RemoteError> {
        let mut rooms = HashMap::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![
                ("types", "public_channel,private_channel".to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", "1000".to_string()),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }
            let request = self
                .http
                .get(self.url("conversations.list"))
                .bearer_auth(&self.token)
                .query(&query);
            let page: ConversationsPage = self.send("conversations.list", request).await?;
            for channel in page.channels {
                if let Some(name) = channel.name {
                    rooms.insert(name, channel.id);
                }
            }
            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }
        Ok(rooms)
    }

    /// Post a message; returns the new message's `ts`.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<Value>,
    ) -> Result<String, RemoteError> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::String(ts.to_string());
        }
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }
        self.call::<PostMessage>("chat.postMessage", &self.token, body)
            .await
            .map(|r| r.ts)
    }

    pub async fn add_reaction(&self, name: &str, channel: &str, ts: &str) -> Result<(), RemoteError> {
        self.reaction_call("reactions.add", name, channel, ts).await
    }

    pub async fn remove_reaction(
        &self,
        name: &str,
        channel: &str,
        ts: &str,
    ) -> Result<(), RemoteError> {
        self.reaction_call("reactions.remove", name, channel, ts).await
    }

    /// Ask for a socket-mode websocket URL using the app-level token.
    pub async fn open_connection(&self, app_token: &str) -> Result<String, RemoteError> {
        self.call::<ConnectionsOpen>("apps.connections.open", app_token, json!({}))
            .await
            .map(|r| r.url)
    }

    async fn reaction_call(
        &self,
        method: &str,
        name: &str,
        channel: &str,
        ts: &str,
    ) -> Result<(), RemoteError> {
        let body = json!({
            "name": name.trim_matches(':'),
            "channel": channel,
            "timestamp": ts,
        });
        self.call::<Value>(method, &self.token, body).await.map(|_| ())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        body: Value,
    ) -> Result<T, RemoteError> {
        let request = self.http.post(self.url(method)).bearer_auth(token).json(&body);
        self.send(method, request).await
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        debug!("slack api call: {}", method);
        let envelope: Value = request
            .send()
            .await
            .map_err(|e| RemoteError::Transient(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("{method}: {e}")))?;

        if !envelope.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let reason = envelope
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(match reason {
                "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" => {
                    RemoteError::Authentication(format!("{method}: {reason}"))
                }
                _ => RemoteError::Transient(format!("{method}: {reason}")),
            });
        }

        serde_json::from_value(envelope)
            .map_err(|e| RemoteError::Transient(format!("{method}: unexpected response: {e}")))
    }
}
