//! # Slack Remote Adapter
//!
//! Implements the `Remote` trait for Slack. Bridges socket mode / events API
//! ingestion and the Web API (send, react, interactive messages) to the bot's
//! internal message model.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::bot::BotContext;
use crate::domain::config::SlackConfig;
use crate::domain::traits::Remote;
use crate::domain::types::{Message, Rule, RuleMap, message_timestamp};
use crate::infrastructure::slack::api::SlackApi;
use crate::infrastructure::slack::interactions::{InteractionServer, build_blocks};
use crate::infrastructure::slack::{MAX_MESSAGE_LENGTH, events, is_valid_path, socket};
use crate::strings::messages::truncate_output;

/// How inbound events reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Socket { app_token: String },
    Events { signing_secret: String },
    None,
}

/// Socket mode wins over the events API when both are configured.
pub fn select_transport(config: &SlackConfig) -> Transport {
    if !config.app_token.is_empty() {
        Transport::Socket {
            app_token: config.app_token.clone(),
        }
    } else if !config.signing_secret.is_empty() {
        Transport::Events {
            signing_secret: config.signing_secret.clone(),
        }
    } else {
        Transport::None
    }
}

pub struct SlackRemote {
    config: SlackConfig,
    api: SlackApi,
    interactions: Arc<InteractionServer>,
}

impl SlackRemote {
    pub fn new(config: SlackConfig, interactions: Arc<InteractionServer>) -> Self {
        let api = SlackApi::new(&config.api_url, &config.token);
        Self {
            config,
            api,
            interactions,
        }
    }
}

#[async_trait]
impl Remote for SlackRemote {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn read(&self, inbound: mpsc::Sender<Message>, rules: Arc<RuleMap>, bot: Arc<BotContext>) {
        let user_id = match self.api.auth_test().await {
            Ok(user_id) => user_id,
            Err(e) => {
                error!(
                    "the 'slack_token' that was provided was invalid or is unauthorized - closing slack message reader: {}",
                    e
                );
                return;
            }
        };
        bot.set_id(&user_id);

        match self.api.conversations().await {
            Ok(rooms) => bot.set_rooms(rooms),
            Err(e) => warn!("could not list slack channels: {}", e),
        }
        info!(
            "slack reader started as {} with {} rules loaded",
            user_id,
            rules.len()
        );

        match select_transport(&self.config) {
            Transport::Socket { app_token } => {
                socket::read_socket_mode(&self.api, &app_token, &inbound, &bot).await;
            }
            Transport::Events { signing_secret } => {
                let path = &self.config.events_callback_path;
                if !is_valid_path(path) {
                    error!(
                        "invalid events callback path '{}' - please double check 'events_callback_path' (e.g. \"/slack_events/v1/events\")",
                        path
                    );
                    warn!("closing slack message reader (events api is disabled)");
                    return;
                }
                if let Err(e) = events::serve(
                    self.config.listener_port,
                    path,
                    &signing_secret,
                    inbound,
                    bot.clone(),
                )
                .await
                {
                    error!("slack events api reader stopped: {:#}", e);
                }
            }
            Transport::None => {
                if !bot.cli {
                    error!("cli mode is disabled and tokens are not set up correctly to run the bot");
                }
            }
        }
    }

    async fn send(&self, mut message: Message, _bot: &BotContext) {
        debug!("sending message '{}'", message.id);

        message.output = truncate_output(&message.output, MAX_MESSAGE_LENGTH);
        message.end_time = message_timestamp();

        if !message.message_type.is_deliverable() {
            warn!("received unknown message type - no message to send");
            return;
        }
        if let Err(e) = self
            .api
            .post_message(
                &message.channel_id,
                &message.output,
                message.thread_timestamp.as_deref(),
                None,
            )
            .await
        {
            error!("failed to send message '{}': {}", message.id, e);
        }
    }

    async fn reaction(&self, message: &Message, rule: &Rule, _bot: &BotContext) {
        if !rule.remove_reaction.is_empty() {
            match self
                .api
                .remove_reaction(&rule.remove_reaction, &message.channel_id, &message.timestamp)
                .await
            {
                Ok(()) => info!(
                    "removed reaction '{}' for rule '{}'",
                    rule.remove_reaction, rule.name
                ),
                Err(e) => error!("could not remove reaction: {}", e),
            }
        }
        if !rule.reaction.is_empty() {
            match self
                .api
                .add_reaction(&rule.reaction, &message.channel_id, &message.timestamp)
                .await
            {
                Ok(()) => info!("added reaction '{}' for rule '{}'", rule.reaction, rule.name),
                Err(e) => error!("could not add reaction: {}", e),
            }
        }
    }

    async fn interactive_components(
        &self,
        inbound: mpsc::Sender<Message>,
        message: &Message,
        rule: &Rule,
        bot: Arc<BotContext>,
    ) -> bool {
        if !bot.interactive_components {
            return false;
        }
        if self.interactions.activate(inbound).await.is_none() {
            return false;
        }

        let text = truncate_output(&message.output, MAX_MESSAGE_LENGTH);
        let blocks = build_blocks(&text, &rule.buttons);
        match self
            .api
            .post_message(
                &message.channel_id,
                &text,
                message.thread_timestamp.as_deref(),
                Some(blocks),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "failed to send interactive message for rule '{}': {}",
                    rule.name, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Button, MessageType};
    use crate::infrastructure::slack::interactions::InteractionSettings;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote(api_url: &str, interactions_enabled: bool) -> SlackRemote {
        let config = SlackConfig {
            token: "xoxb-test".to_string(),
            signing_secret: "s3cret".to_string(),
            api_url: api_url.to_string(),
            ..Default::default()
        };
        let interactions = InteractionServer::new(InteractionSettings {
            enabled: interactions_enabled,
            signing_secret: config.signing_secret.clone(),
            callback_path: "/slack/interactions".to_string(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
        });
        SlackRemote::new(config, Arc::new(interactions))
    }

    fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "ts": "1.1"}))
    }

    fn rule(reaction: &str, remove: &str) -> Rule {
        serde_yaml::from_str(&format!(
            "name: r\nreaction: '{}'\nremove_reaction: '{}'\n",
            reaction, remove
        ))
        .unwrap()
    }

    #[test]
    fn test_transport_priority() {
        let mut config = SlackConfig::default();
        assert_eq!(select_transport(&config), Transport::None);
        config.signing_secret = "secret".to_string();
        assert_eq!(
            select_transport(&config),
            Transport::Events {
                signing_secret: "secret".to_string()
            }
        );
        config.app_token = "xapp".to_string();
        assert_eq!(
            select_transport(&config),
            Transport::Socket {
                app_token: "xapp".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_truncates_long_output() {
        let server = MockServer::start().await;
        let expected = format!("{}...", "x".repeat(3997));
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_partial_json(json!({"channel": "C01", "text": expected})))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        let mut msg = Message::new(MessageType::Channel, "C01", "1.0");
        msg.output = "x".repeat(4500);
        remote(&server.uri(), false)
            .send(msg, &BotContext::default())
            .await;
    }

    #[tokio::test]
    async fn test_send_unknown_type_is_noop() {
        let server = MockServer::start().await;
        Mock::given(path("/chat.postMessage"))
            .respond_with(ok())
            .expect(0)
            .mount(&server)
            .await;

        let mut msg = Message::new(MessageType::Unknown, "C01", "1.0");
        msg.output = "hello".to_string();
        remote(&server.uri(), false)
            .send(msg, &BotContext::default())
            .await;
    }

    #[tokio::test]
    async fn test_reaction_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(path("/reactions.remove"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "no_reaction"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/reactions.add"))
            .and(body_partial_json(
                json!({"name": "white_check_mark", "channel": "C01", "timestamp": "7.7"}),
            ))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        let msg = Message::new(MessageType::Channel, "C01", "7.7");
        remote(&server.uri(), false)
            .reaction(&msg, &rule("white_check_mark", "hourglass"), &BotContext::default())
            .await;
    }

    #[tokio::test]
    async fn test_reaction_skips_empty_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok())
            .expect(0)
            .mount(&server)
            .await;

        let msg = Message::new(MessageType::Channel, "C01", "7.7");
        remote(&server.uri(), false)
            .reaction(&msg, &rule("", ""), &BotContext::default())
            .await;
    }

    #[tokio::test]
    async fn test_read_stops_on_bad_token() {
        let server = MockServer::start().await;
        Mock::given(path("/auth.test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/conversations.list"))
            .respond_with(ok())
            .expect(0)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(4);
        let bot = Arc::new(BotContext::default());
        remote(&server.uri(), false)
            .read(tx, Arc::new(RuleMap::new()), bot.clone())
            .await;
        assert_eq!(bot.id(), "");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_events_path_disables_reader() {
        let server = MockServer::start().await;
        Mock::given(path("/auth.test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "user_id": "U0BOT"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "channels": []})))
            .mount(&server)
            .await;

        for bad_path in ["", "slack/events"] {
            let mut remote = remote(&server.uri(), false);
            remote.config.events_callback_path = bad_path.to_string();
            remote.config.listener_port = 0;

            let (tx, mut rx) = mpsc::channel(4);
            let bot = Arc::new(BotContext::default());
            tokio::time::timeout(
                std::time::Duration::from_secs(5),
                remote.read(tx, Arc::new(RuleMap::new()), bot.clone()),
            )
            .await
            .expect("reader should return for an invalid path");
            assert_eq!(bot.id(), "U0BOT");
            assert!(rx.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_interactive_refused_without_server() {
        let server = MockServer::start().await;
        Mock::given(path("/chat.postMessage"))
            .respond_with(ok())
            .expect(0)
            .mount(&server)
            .await;

        let mut rule = rule("", "");
        rule.buttons = vec![Button {
            text: "Approve".to_string(),
            value: "approve".to_string(),
        }];
        let mut msg = Message::new(MessageType::Channel, "C01", "1.0");
        msg.output = "Deploy?".to_string();

        let mut bot = BotContext::default();
        bot.interactive_components = true;
        let (tx, _rx) = mpsc::channel(4);
        let remote = remote(&server.uri(), false);
        assert!(
            !remote
                .interactive_components(tx, &msg, &rule, Arc::new(bot))
                .await
        );
        assert!(remote.interactions.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_interactive_message_posts_blocks() {
        let server = MockServer::start().await;
        Mock::given(path("/chat.postMessage"))
            .and(body_partial_json(json!({"channel": "C01", "text": "Deploy?"})))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        let mut rule = rule("", "");
        rule.buttons = vec![Button {
            text: "Approve".to_string(),
            value: "approve".to_string(),
        }];
        let mut msg = Message::new(MessageType::Channel, "C01", "1.0");
        msg.output = "Deploy?".to_string();

        let mut bot = BotContext::default();
        bot.interactive_components = true;
        let (tx, _rx) = mpsc::channel(4);
        let remote = remote(&server.uri(), true);
        assert!(
            remote
                .interactive_components(tx, &msg, &rule, Arc::new(bot))
                .await
        );
        assert!(remote.interactions.local_addr().is_some());

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["blocks"][0]["text"]["text"], "Deploy?");
        assert_eq!(body["blocks"][1]["elements"][0]["value"], "approve");
    }
}
