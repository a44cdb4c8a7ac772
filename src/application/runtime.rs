//! # Bot Runtime
//!
//! Wires a remote, the rule engine and the message channels together:
//!
//! ```text
//! remote.read ──inbound──▶ RuleEngine ──outbound──▶ remote.send
//!      ▲                        │
//!      └── interaction server ◀─┘ (buttons)
//! ```

use anyhow::{Context, Result, bail};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::application::engine::RuleEngine;
use crate::domain::bot::BotContext;
use crate::domain::config::{BotConfig, ChatApplication};
use crate::domain::traits::Remote;
use crate::domain::types::{Message, RuleMap};
use crate::infrastructure::cli::CliRemote;
use crate::infrastructure::matrix::MatrixRemote;
use crate::infrastructure::process::ScriptRunner;
use crate::infrastructure::slack::SlackRemote;
use crate::infrastructure::slack::interactions::{InteractionServer, InteractionSettings};

pub struct BotRuntime {
    config: BotConfig,
    bot: Arc<BotContext>,
    rules: Arc<RuleMap>,
    remote: Arc<dyn Remote>,
}

/// Interaction server settings derived from the bot config.
pub fn interaction_settings(config: &BotConfig) -> InteractionSettings {
    InteractionSettings {
        enabled: config.interactive_components,
        signing_secret: config.slack.signing_secret.clone(),
        callback_path: config.slack.interactions_callback_path.clone(),
        bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.slack.interactions_port)),
    }
}

/// Pick the chat backend. CLI mode overrides `chat_application`.
pub fn select_remote(config: &BotConfig) -> Result<Arc<dyn Remote>> {
    if config.cli {
        return Ok(Arc::new(CliRemote::new()));
    }
    match config.chat_application {
        ChatApplication::Slack => {
            let interactions = Arc::new(InteractionServer::new(interaction_settings(config)));
            Ok(Arc::new(SlackRemote::new(config.slack.clone(), interactions)))
        }
        ChatApplication::Matrix => {
            let Some(matrix) = &config.matrix else {
                bail!("chat_application is 'matrix' but no 'matrix' section is configured");
            };
            Ok(Arc::new(MatrixRemote::new(matrix.clone())))
        }
    }
}

impl BotRuntime {
    pub fn new(config: BotConfig, rules: RuleMap, debug: bool) -> Result<Self> {
        let remote = select_remote(&config)?;
        Ok(Self::with_remote(config, rules, debug, remote))
    }

    pub fn with_remote(
        config: BotConfig,
        rules: RuleMap,
        debug: bool,
        remote: Arc<dyn Remote>,
    ) -> Self {
        let bot = Arc::new(BotContext::new(&config, debug));
        Self {
            config,
            bot,
            rules: Arc::new(rules),
            remote,
        }
    }

    /// Run until the remote stops producing messages and every reply has been sent.
    pub async fn run(self) -> Result<()> {
        let capacity = self.config.message_buffer.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Message>(capacity);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(capacity);

        let engine = RuleEngine::new(
            self.rules.clone(),
            ScriptRunner::new(self.config.exec_timeout),
            self.remote.clone(),
            self.bot.clone(),
            inbound_tx.downgrade(),
            outbound_tx,
        )
        .context("Failed to build rule engine")?;

        info!(
            "starting {} with the {} remote and {} rules",
            self.bot.name,
            self.remote.name(),
            self.rules.len()
        );

        let reader = {
            let remote = self.remote.clone();
            let rules = self.rules.clone();
            let bot = self.bot.clone();
            tokio::spawn(async move {
                remote.read(inbound_tx, rules, bot).await;
                info!("{} reader stopped", remote.name());
            })
        };

        let sender = {
            let remote = self.remote.clone();
            let bot = self.bot.clone();
            tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    remote.send(message, &bot).await;
                }
            })
        };

        Arc::new(engine).run(inbound_rx).await;

        if let Err(e) = reader.await {
            error!("reader task failed: {}", e);
        }
        sender.await.context("Sender task failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{MessageType, Rule};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn config(yaml: &str) -> BotConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    /// Emits a fixed set of messages, then stops.
    struct ScriptedRemote {
        inputs: Vec<String>,
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Remote for ScriptedRemote {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn read(&self, inbound: mpsc::Sender<Message>, _: Arc<RuleMap>, _: Arc<BotContext>) {
            for (i, input) in self.inputs.iter().enumerate() {
                let mut msg = Message::new(MessageType::Direct, "D01", &i.to_string());
                msg.input = input.clone();
                inbound.send(msg).await.unwrap();
            }
        }

        async fn send(&self, message: Message, _: &BotContext) {
            self.sent.lock().unwrap().push(message);
        }

        async fn reaction(&self, _: &Message, _: &Rule, _: &BotContext) {}

        async fn interactive_components(
            &self,
            _: mpsc::Sender<Message>,
            _: &Message,
            _: &Rule,
            _: Arc<BotContext>,
        ) -> bool {
            false
        }
    }

    #[test]
    fn test_matrix_without_section_is_an_error() {
        let err = select_remote(&config("name: bot\nchat_application: matrix\n"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("matrix"));
    }

    #[test]
    fn test_remote_selection() {
        assert_eq!(select_remote(&config("name: bot\n")).unwrap().name(), "slack");
        assert_eq!(
            select_remote(&config("name: bot\ncli: true\nchat_application: matrix\n"))
                .unwrap()
                .name(),
            "cli"
        );
        let matrix = config(
            "name: bot\nchat_application: matrix\nmatrix:\n  homeserver: https://m.org\n  username: u\n  password: p\n",
        );
        assert_eq!(select_remote(&matrix).unwrap().name(), "matrix");
    }

    #[test]
    fn test_interaction_settings() {
        let cfg = config(
            "name: bot\ninteractive_components: true\nslack:\n  signing_secret: s\n  interactions_callback_path: /cb\n  interactions_port: 4100\n",
        );
        let settings = interaction_settings(&cfg);
        assert!(settings.enabled);
        assert_eq!(settings.callback_path, "/cb");
        assert_eq!(settings.bind_addr.port(), 4100);
    }

    #[tokio::test]
    async fn test_run_replies_and_stops_when_reader_ends() {
        let rule: Rule =
            serde_yaml::from_str("name: ping\nhear: ^ping$\nactions:\n  - cmd: echo pong\n")
                .unwrap();
        let rules = RuleMap::from([(rule.name.clone(), rule)]);
        let remote = Arc::new(ScriptedRemote {
            inputs: vec!["ping".to_string(), "nothing".to_string(), "ping".to_string()],
            sent: Mutex::new(Vec::new()),
        });

        BotRuntime::with_remote(config("name: bot\nmessage_buffer: 1\n"), rules, false, remote.clone())
            .run()
            .await
            .unwrap();

        let sent = remote.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.output == "pong"));
    }
}
