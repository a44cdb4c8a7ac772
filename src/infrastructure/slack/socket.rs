//! # Socket Mode
//!
//! Persistent websocket session with Slack. Every envelope is acknowledged
//! before its payload is forwarded so acks never wait on the rule engine.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::domain::bot::BotContext;
use crate::domain::types::Message;
use crate::infrastructure::slack::api::SlackApi;
use crate::infrastructure::slack::events::{forward, translate_value};
use crate::infrastructure::slack::interactions::decode_interaction;

/// Pause before renewing a session that ended with an error.
const RENEW_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// What to do with one decoded envelope.
#[derive(Debug, PartialEq)]
pub enum EnvelopeAction {
    Forward(Box<Message>),
    Renew,
    Ignore,
}

/// Decide what an envelope means for the session.
pub fn handle_envelope(envelope: Envelope, bot: &BotContext) -> EnvelopeAction {
    match envelope.kind.as_str() {
        "hello" => {
            debug!("slack socket mode connected");
            EnvelopeAction::Ignore
        }
        "disconnect" => EnvelopeAction::Renew,
        "events_api" => envelope
            .payload
            .and_then(|mut payload| payload.get_mut("event").map(Value::take))
            .and_then(|event| translate_value(event, bot))
            .map(|m| EnvelopeAction::Forward(Box::new(m)))
            .unwrap_or(EnvelopeAction::Ignore),
        "interactive" => envelope
            .payload
            .and_then(|payload| match decode_interaction(payload) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("could not decode interaction: {}", e);
                    None
                }
            })
            .map(|m| EnvelopeAction::Forward(Box::new(m)))
            .unwrap_or(EnvelopeAction::Ignore),
        other => {
            debug!("ignoring socket mode envelope type '{}'", other);
            EnvelopeAction::Ignore
        }
    }
}

/// Run socket mode until the session can no longer be opened or the inbound channel closes.
pub async fn read_socket_mode(
    api: &SlackApi,
    app_token: &str,
    inbound: &mpsc::Sender<Message>,
    bot: &BotContext,
) {
    loop {
        let url = match api.open_connection(app_token).await {
            Ok(url) => url,
            Err(e) => {
                error!(
                    "could not open slack socket mode connection - closing slack message reader: {}",
                    e
                );
                return;
            }
        };

        match run_session(&url, inbound, bot).await {
            Ok(SessionEnd::Renew) => info!("slack requested a new socket mode session"),
            Ok(SessionEnd::ChannelClosed) => return,
            Err(e) => {
                warn!("slack socket mode session ended: {:#}", e);
                tokio::time::sleep(RENEW_DELAY).await;
            }
        }
    }
}

enum SessionEnd {
    Renew,
    ChannelClosed,
}

async fn run_session(
    url: &str,
    inbound: &mpsc::Sender<Message>,
    bot: &BotContext,
) -> Result<SessionEnd> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .context("Failed to connect socket mode websocket")?;
    let (mut sink, mut stream) = ws.split();

    while let Some(frame) = stream.next().await {
        match frame.context("Socket mode read failed")? {
            WsMessage::Text(text) => {
                let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("unparseable socket mode frame: {}", e);
                        continue;
                    }
                };
                if let Some(id) = &envelope.envelope_id {
                    let ack = json!({ "envelope_id": id }).to_string();
                    sink.send(WsMessage::Text(ack.into()))
                        .await
                        .context("Failed to acknowledge envelope")?;
                }
                match handle_envelope(envelope, bot) {
                    EnvelopeAction::Forward(message) => {
                        if !forward(inbound, *message).await {
                            return Ok(SessionEnd::ChannelClosed);
                        }
                    }
                    EnvelopeAction::Renew => return Ok(SessionEnd::Renew),
                    EnvelopeAction::Ignore => {}
                }
            }
            WsMessage::Ping(data) => {
                sink.send(WsMessage::Pong(data))
                    .await
                    .context("Failed to answer ping")?;
            }
            WsMessage::Close(_) => return Ok(SessionEnd::Renew),
            _ => {}
        }
    }
    Ok(SessionEnd::Renew)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::MessageType;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_events_api_envelope_forwards() {
        let bot = BotContext::default();
        bot.set_id("U0BOT");
        let action = handle_envelope(
            envelope(json!({
                "type": "events_api",
                "envelope_id": "e1",
                "payload": {"event": {
                    "type": "message", "channel": "D01", "channel_type": "im",
                    "user": "U1", "text": "hi", "ts": "3.1"
                }}
            })),
            &bot,
        );
        match action {
            EnvelopeAction::Forward(msg) => {
                assert_eq!(msg.message_type, MessageType::Direct);
                assert_eq!(msg.input, "hi");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_control_envelopes() {
        let bot = BotContext::default();
        assert_eq!(
            handle_envelope(envelope(json!({"type": "hello"})), &bot),
            EnvelopeAction::Ignore
        );
        assert_eq!(
            handle_envelope(
                envelope(json!({"type": "disconnect", "payload": {"reason": "refresh_requested"}})),
                &bot
            ),
            EnvelopeAction::Renew
        );
        assert_eq!(
            handle_envelope(
                envelope(json!({"type": "slash_commands", "envelope_id": "e2"})),
                &bot
            ),
            EnvelopeAction::Ignore
        );
    }

    #[test]
    fn test_bot_echo_is_ignored() {
        let bot = BotContext::default();
        bot.set_id("U0BOT");
        let action = handle_envelope(
            envelope(json!({
                "type": "events_api",
                "payload": {"event": {"type": "message", "channel": "C1", "user": "U0BOT", "ts": "1"}}
            })),
            &bot,
        );
        assert_eq!(action, EnvelopeAction::Ignore);
    }

    fn event_frame(envelope_id: &str, text: &str) -> WsMessage {
        let frame = json!({
            "type": "events_api",
            "envelope_id": envelope_id,
            "payload": {"event": {
                "type": "message", "channel": "C01", "channel_type": "channel",
                "user": "U1", "text": text, "ts": envelope_id
            }}
        });
        WsMessage::Text(frame.to_string().into())
    }

    /// Fake socket-mode endpoint. The first session is told to reconnect; the
    /// second delivers two events, collects their acks, then waits for `resume`
    /// before sending a third event.
    async fn socket_mode_server(listener: TcpListener, resume: oneshot::Receiver<()>) -> Vec<String> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(WsMessage::Text(json!({"type": "hello"}).to_string().into()))
            .await
            .unwrap();
        ws.send(WsMessage::Text(
            json!({"type": "disconnect", "payload": {"reason": "refresh_requested"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(event_frame("e1", "first")).await.unwrap();
        ws.send(WsMessage::Ping(Default::default())).await.unwrap();
        ws.send(event_frame("e2", "second")).await.unwrap();

        let mut acks = Vec::new();
        while acks.len() < 2 {
            if let WsMessage::Text(text) = ws.next().await.unwrap().unwrap() {
                let ack: Value = serde_json::from_str(text.as_str()).unwrap();
                acks.push(ack["envelope_id"].as_str().unwrap().to_string());
            }
        }

        resume.await.unwrap();
        ws.send(event_frame("e3", "third")).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
        acks
    }

    #[tokio::test]
    async fn test_session_acks_and_forwards_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}", listener.local_addr().unwrap());

        let api_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "url": ws_url})),
            )
            .expect(2)
            .mount(&api_server)
            .await;

        let (resume_tx, resume_rx) = oneshot::channel();
        let server = tokio::spawn(socket_mode_server(listener, resume_rx));

        let (tx, mut rx) = mpsc::channel(8);
        let api = SlackApi::new(&api_server.uri(), "xoxb-test");
        let reader = tokio::spawn(async move {
            let bot = BotContext::default();
            bot.set_id("U0BOT");
            read_socket_mode(&api, "xapp-test", &tx, &bot).await;
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.input, "first");
        assert_eq!(first.message_type, MessageType::Channel);
        assert_eq!(second.input, "second");

        // Once the consumer is gone the reader stops instead of reconnecting
        drop(rx);
        resume_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader should stop once the channel is closed")
            .unwrap();

        assert_eq!(server.await.unwrap(), vec!["e1", "e2"]);
    }
}
