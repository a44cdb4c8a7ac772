//! # Rule Engine
//!
//! Consumes inbound messages, matches them against the loaded rules and runs the
//! matching rules' actions. Each matched rule is handled in its own task so a slow
//! script never holds up ingestion; its reply always follows the triggering message.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::substitution::substitute;
use crate::domain::bot::BotContext;
use crate::domain::traits::Remote;
use crate::domain::types::{Message, Rule, RuleMap};
use crate::infrastructure::process::ScriptRunner;
use crate::strings::messages;

/// Output template used when a rule with actions doesn't define one.
pub const DEFAULT_OUTPUT: &str = "${_exec_output}";

pub struct RuleEngine {
    rules: Arc<RuleMap>,
    /// (rule name, compiled `hear` pattern), sorted by name
    matchers: Vec<(String, Regex)>,
    runner: ScriptRunner,
    remote: Arc<dyn Remote>,
    bot: Arc<BotContext>,
    /// Weak so the inbound channel closes once every real producer is gone.
    inbound: mpsc::WeakSender<Message>,
    outbound: mpsc::Sender<Message>,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<RuleMap>,
        runner: ScriptRunner,
        remote: Arc<dyn Remote>,
        bot: Arc<BotContext>,
        inbound: mpsc::WeakSender<Message>,
        outbound: mpsc::Sender<Message>,
    ) -> Result<Self> {
        let mut matchers = Vec::new();
        for rule in rules.values().filter(|r| r.active) {
            if let Some(hear) = &rule.hear {
                let regex = Regex::new(hear)
                    .with_context(|| format!("Bad 'hear' pattern for rule '{}'", rule.name))?;
                matchers.push((rule.name.clone(), regex));
            }
        }
        matchers.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            rules,
            matchers,
            runner,
            remote,
            bot,
            inbound,
            outbound,
        })
    }

    /// Rules whose pattern matches `message.input`, with their named captures.
    pub fn matching_rules(&self, message: &Message) -> Vec<(Rule, HashMap<String, String>)> {
        let mut matched = Vec::new();
        for (name, regex) in &self.matchers {
            let Some(caps) = regex.captures(&message.input) else {
                continue;
            };
            let Some(rule) = self.rules.get(name) else {
                continue;
            };
            let vars = regex
                .capture_names()
                .flatten()
                .filter_map(|group| {
                    caps.name(group)
                        .map(|m| (group.to_string(), m.as_str().to_string()))
                })
                .collect();
            matched.push((rule.clone(), vars));
        }
        matched
    }

    /// Process messages until every producer has hung up.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<Message>) {
        while let Some(message) = inbound.recv().await {
            self.dispatch(message);
        }
        info!("inbound message channel closed - rule engine stopping");
    }

    fn dispatch(self: &Arc<Self>, message: Message) {
        let matched = self.matching_rules(&message);
        if matched.is_empty() {
            debug!("no rule matched message '{}'", message.id);
            return;
        }
        for (rule, captures) in matched {
            let engine = self.clone();
            let mut message = message.clone();
            message.vars.extend(captures);
            tokio::spawn(async move {
                engine.handle_rule(&rule, message).await;
            });
        }
    }

    /// React, run the rule's actions in order and emit the formatted reply.
    pub async fn handle_rule(&self, rule: &Rule, mut message: Message) {
        info!("rule '{}' matched message '{}'", rule.name, message.id);
        self.remote.reaction(&message, rule, &self.bot).await;

        for action in &rule.actions {
            let mut action = action.clone();
            if action.timeout == 0 {
                action.timeout = rule.timeout;
            }
            let result = match self.runner.exec(&action, &message.vars).await {
                Ok(result) => result,
                Err(failure) => {
                    warn!(
                        "action '{}' for rule '{}' failed: {}",
                        action.name, rule.name, failure.error
                    );
                    failure.result
                }
            };
            message
                .vars
                .insert("_exec_status".to_string(), result.status.to_string());
            message
                .vars
                .insert("_exec_output".to_string(), result.output);
        }

        let template = match (&rule.format_output, rule.actions.is_empty()) {
            (Some(template), _) => template.as_str(),
            (None, false) => DEFAULT_OUTPUT,
            (None, true) => return,
        };
        let output = match substitute(template, &message.vars) {
            Ok(output) => output,
            Err(e) => {
                warn!("could not format output for rule '{}': {}", rule.name, e);
                messages::substitution_failed(&rule.name, &e.to_string())
            }
        };
        if output.trim().is_empty() {
            debug!("rule '{}' produced no output", rule.name);
            return;
        }

        let mut reply = message.reply();
        reply.output = output;

        if !rule.buttons.is_empty() && self.bot.interactive_components {
            if let Some(inbound) = self.inbound.upgrade() {
                if self
                    .remote
                    .interactive_components(inbound, &reply, rule, self.bot.clone())
                    .await
                {
                    return;
                }
                debug!("rule '{}' falls back to a plain reply", rule.name);
            }
        }
        if self.outbound.send(reply).await.is_err() {
            warn!("outbound message channel closed - dropping reply for rule '{}'", rule.name);
        }
    }
}
