//! # Domain Traits
//!
//! The `Remote` capability set every chat backend implements (Slack, Matrix, CLI).
//! The runtime and rule engine only ever talk to `dyn Remote`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::bot::BotContext;
use crate::domain::types::{Message, Rule, RuleMap};

#[async_trait]
pub trait Remote: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Ingest platform events into `inbound` for the lifetime of the bot.
    /// Returns early only when the remote cannot authenticate or is not configured.
    async fn read(&self, inbound: mpsc::Sender<Message>, rules: Arc<RuleMap>, bot: Arc<BotContext>);

    /// Deliver `message.output` to the message's channel. Failures are logged, not returned.
    async fn send(&self, message: Message, bot: &BotContext);

    /// Apply `rule.remove_reaction` / `rule.reaction` to the referenced message (best effort).
    async fn reaction(&self, message: &Message, rule: &Rule, bot: &BotContext);

    /// Send an interactive message for `rule`, making sure the interaction endpoint is up.
    /// Returns false when nothing was delivered, so the caller can fall back to `send`.
    async fn interactive_components(
        &self,
        inbound: mpsc::Sender<Message>,
        message: &Message,
        rule: &Rule,
        bot: Arc<BotContext>,
    ) -> bool;
}
