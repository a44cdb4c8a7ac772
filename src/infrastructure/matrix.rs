//! # Matrix Remote Adapter
//!
//! Implements the `Remote` trait for the Matrix protocol using `matrix_sdk`.
//! Room ids play the role of channel ids and event ids the role of message timestamps.

use async_trait::async_trait;
use matrix_sdk::config::SyncSettings;
use matrix_sdk::room::Room;
use matrix_sdk::ruma::events::reaction::ReactionEventContent;
use matrix_sdk::ruma::events::relation::Annotation;
use matrix_sdk::ruma::events::room::message::{
    MessageType as MatrixMessageType, RoomMessageEventContent, SyncRoomMessageEvent,
};
use matrix_sdk::ruma::{EventId, OwnedEventId, RoomId};
use matrix_sdk::Client;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, mpsc};
use tracing::{debug, error, info, warn};

use crate::domain::bot::BotContext;
use crate::domain::config::MatrixConfig;
use crate::domain::error::RemoteError;
use crate::domain::traits::Remote;
use crate::domain::types::{Message, MessageType, Rule, RuleMap, message_timestamp};
use crate::strings::messages::{INTERACTIONS_UNSUPPORTED, truncate_output};

/// Generous cap that keeps events well under the homeserver's 64KiB limit.
pub const MAX_MESSAGE_LENGTH: usize = 32_000;

/// (room id, target event id, reaction key)
type ReactionKey = (String, String, String);

pub struct MatrixRemote {
    config: MatrixConfig,
    client: OnceCell<Client>,
    /// Reactions this bot sent, so they can be redacted later.
    sent_reactions: Mutex<HashMap<ReactionKey, OwnedEventId>>,
}

impl MatrixRemote {
    pub fn new(config: MatrixConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            sent_reactions: Mutex::new(HashMap::new()),
        }
    }

    async fn login(&self) -> Result<Client, RemoteError> {
        let client = Client::builder()
            .homeserver_url(&self.config.homeserver)
            .build()
            .await
            .map_err(|e| RemoteError::Configuration(e.to_string()))?;
        client
            .matrix_auth()
            .login_username(&self.config.username, &self.config.password)
            .send()
            .await
            .map_err(|e| RemoteError::Authentication(e.to_string()))?;
        Ok(client)
    }

    fn room(&self, room_id: &str) -> Result<Room, RemoteError> {
        let client = self
            .client
            .get()
            .ok_or_else(|| RemoteError::Transient("matrix client not logged in".to_string()))?;
        let room_id =
            <&RoomId>::try_from(room_id).map_err(|e| RemoteError::Transient(e.to_string()))?;
        client
            .get_room(room_id)
            .ok_or_else(|| RemoteError::Transient(format!("unknown room {}", room_id)))
    }

    async fn add_reaction(&self, message: &Message, key: &str) -> Result<(), RemoteError> {
        let room = self.room(&message.channel_id)?;
        let target = <&EventId>::try_from(message.timestamp.as_str())
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        let content = ReactionEventContent::new(Annotation::new(target.to_owned(), key.to_string()));
        let response = room
            .send(content)
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        self.sent_reactions.lock().await.insert(
            (
                message.channel_id.clone(),
                message.timestamp.clone(),
                key.to_string(),
            ),
            response.event_id,
        );
        Ok(())
    }

    async fn remove_reaction(&self, message: &Message, key: &str) -> Result<(), RemoteError> {
        let reaction_id = self
            .sent_reactions
            .lock()
            .await
            .remove(&(
                message.channel_id.clone(),
                message.timestamp.clone(),
                key.to_string(),
            ))
            .ok_or_else(|| RemoteError::Transient(format!("no '{}' reaction to remove", key)))?;
        let room = self.room(&message.channel_id)?;
        room.redact(&reaction_id, None, None)
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Remote for MatrixRemote {
    fn name(&self) -> &'static str {
        "matrix"
    }

    async fn read(&self, inbound: mpsc::Sender<Message>, rules: Arc<RuleMap>, bot: Arc<BotContext>) {
        let client = match self.login().await {
            Ok(client) => client,
            Err(e) => {
                error!("could not log in to matrix - closing matrix message reader: {}", e);
                return;
            }
        };
        if let Some(user_id) = client.user_id() {
            bot.set_id(user_id.as_str());
        }
        let rooms = client
            .joined_rooms()
            .into_iter()
            .filter_map(|room| room.name().map(|name| (name, room.room_id().to_string())))
            .collect();
        bot.set_rooms(rooms);
        info!(
            "logged in to matrix as {} with {} rules loaded",
            self.config.username,
            rules.len()
        );

        let start_time = std::time::SystemTime::now();
        let handler_bot = bot.clone();
        client.add_event_handler(move |ev: SyncRoomMessageEvent, room: Room| {
            let inbound = inbound.clone();
            let bot = handler_bot.clone();
            async move {
                let Some(original) = ev.as_original() else {
                    return;
                };
                // Ignore the backlog delivered by the first sync
                let event_time = std::time::UNIX_EPOCH
                    + std::time::Duration::from_millis(ev.origin_server_ts().get().into());
                if event_time < start_time {
                    return;
                }
                if original.sender == room.own_user_id() {
                    return;
                }
                let MatrixMessageType::Text(text) = &original.content.msgtype else {
                    return;
                };

                let message_type = if room.is_direct().await.unwrap_or(false) {
                    MessageType::Direct
                } else {
                    MessageType::Channel
                };
                let room_id = room.room_id().to_string();
                let mut message =
                    Message::new(message_type, &room_id, original.event_id.as_str());
                message.user_id = original.sender.to_string();
                message.input = text.body.clone();
                message.channel_name = bot.room_name(&room_id).unwrap_or_default();
                message.start_time = message_timestamp();
                message
                    .vars
                    .insert("_user.id".to_string(), message.user_id.clone());
                message.vars.insert("_channel.id".to_string(), room_id);
                message
                    .vars
                    .insert("_channel.name".to_string(), message.channel_name.clone());

                debug!("received matrix message {}", message.timestamp);
                if inbound.send(message).await.is_err() {
                    warn!("inbound message channel closed - dropping matrix event");
                }
            }
        });

        // Handle invites
        client.add_event_handler(
            |ev: matrix_sdk::ruma::events::room::member::StrippedRoomMemberEvent, room: Room| async move {
                if ev.content.membership == matrix_sdk::ruma::events::room::member::MembershipState::Invite {
                    if let Err(e) = room.join().await {
                        warn!("failed to join room {}: {}", room.room_id(), e);
                    }
                }
            },
        );

        if self.client.set(client.clone()).is_err() {
            debug!("matrix client already set - keeping the first session");
        }
        if let Err(e) = client.sync(SyncSettings::default()).await {
            error!("matrix sync stopped: {}", e);
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
        let result = match self.room(&message.channel_id) {
            Ok(room) => room
                .send(RoomMessageEventContent::text_markdown(&message.output))
                .await
                .map(|_| ())
                .map_err(|e| RemoteError::Transient(e.to_string())),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("failed to send message '{}': {}", message.id, e);
        }
    }

    async fn reaction(&self, message: &Message, rule: &Rule, _bot: &BotContext) {
        if !rule.remove_reaction.is_empty() {
            match self.remove_reaction(message, &rule.remove_reaction).await {
                Ok(()) => info!(
                    "removed reaction '{}' for rule '{}'",
                    rule.remove_reaction, rule.name
                ),
                Err(e) => error!("could not remove reaction: {}", e),
            }
        }
        if !rule.reaction.is_empty() {
            match self.add_reaction(message, &rule.reaction).await {
                Ok(()) => info!("added reaction '{}' for rule '{}'", rule.reaction, rule.name),
                Err(e) => error!("could not add reaction: {}", e),
            }
        }
    }

    async fn interactive_components(
        &self,
        _inbound: mpsc::Sender<Message>,
        _message: &Message,
        rule: &Rule,
        _bot: Arc<BotContext>,
    ) -> bool {
        warn!("{} (rule '{}')", INTERACTIONS_UNSUPPORTED, rule.name);
        false
    }
}
