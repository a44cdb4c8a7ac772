//! # CLI Remote
//!
//! Non-networked interactive mode: stdin lines become direct messages and
//! replies are written to stdout.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};

use crate::domain::bot::BotContext;
use crate::domain::traits::Remote;
use crate::domain::types::{Message, MessageType, Rule, RuleMap, message_timestamp};
use crate::strings::messages::INTERACTIONS_UNSUPPORTED;

pub const CLI_CHANNEL: &str = "cli";
pub const CLI_USER: &str = "cli-user";

#[derive(Debug, Default)]
pub struct CliRemote;

impl CliRemote {
    pub fn new() -> Self {
        Self
    }

    /// Forward every non-empty line from `input` until EOF or the channel closes.
    pub async fn read_from<R>(&self, input: R, inbound: &mpsc::Sender<Message>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = LinesStream::new(input.lines());
        let mut sequence: u64 = 0;
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("failed reading cli input: {}", e);
                    break;
                }
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            sequence += 1;
            let mut message =
                Message::new(MessageType::Direct, CLI_CHANNEL, &sequence.to_string());
            message.user_id = CLI_USER.to_string();
            message.input = text.to_string();
            message
                .vars
                .insert("_user.id".to_string(), CLI_USER.to_string());
            message
                .vars
                .insert("_channel.id".to_string(), CLI_CHANNEL.to_string());
            if inbound.send(message).await.is_err() {
                warn!("inbound message channel closed - stopping cli reader");
                return;
            }
        }
        debug!("cli input closed");
    }
}

#[async_trait]
impl Remote for CliRemote {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn read(&self, inbound: mpsc::Sender<Message>, rules: Arc<RuleMap>, bot: Arc<BotContext>) {
        bot.set_id(&bot.name);
        info!("cli mode enabled with {} rules loaded - type a message", rules.len());
        self.read_from(BufReader::new(tokio::io::stdin()), &inbound)
            .await;
    }

    async fn send(&self, mut message: Message, bot: &BotContext) {
        message.end_time = message_timestamp();
        if !message.message_type.is_deliverable() {
            warn!("received unknown message type - no message to send");
            return;
        }
        let line = format!("{}> {}\n", bot.name, message.output);
        let mut stdout = tokio::io::stdout();
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            warn!("failed writing to stdout: {}", e);
            return;
        }
        if let Err(e) = stdout.flush().await {
            warn!("failed flushing stdout: {}", e);
        }
    }

    async fn reaction(&self, _message: &Message, rule: &Rule, _bot: &BotContext) {
        if !rule.remove_reaction.is_empty() {
            info!("removed reaction '{}' for rule '{}'", rule.remove_reaction, rule.name);
        }
        if !rule.reaction.is_empty() {
            info!("added reaction '{}' for rule '{}'", rule.reaction, rule.name);
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
