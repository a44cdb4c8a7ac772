#![recursion_limit = "256"]
//! # Main Entry Point
//!
//! Loads the bot configuration and rules, initializes logging and runs the bot:
//! - Domain: configuration, messages, rules, the `Remote` trait
//! - Infrastructure: Slack, Matrix and CLI remotes, the process runner
//! - Application: loader, rule engine, runtime, logging
//!

mod application;
mod domain;
mod infrastructure;
mod strings;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::application::loader;
use crate::application::logging;
use crate::application::runtime::BotRuntime;

#[derive(Parser, Debug)]
#[command(name = "relaybot", version, about = "Chat bot that runs commands in response to messages")]
struct Args {
    /// Bot configuration file
    #[arg(short, long, default_value = "config/bot.yml")]
    config: PathBuf,

    /// Rules directory (overrides `rules_dir` from the config file)
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Read messages from stdin instead of a chat platform
    #[arg(long)]
    cli: bool,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Configuration
    let mut config = loader::load_config(&args.config)?;
    if let Some(rules_dir) = args.rules {
        config.rules_dir = rules_dir;
    }
    config.cli |= args.cli;

    // 2. Logging
    let _guard = logging::init(&config.log, args.debug)?;
    tracing::info!("Starting {}...", config.name);

    // 3. Rules
    let rules = loader::load_rules(&config.rules_dir)?;
    tracing::info!(
        "loaded {} rules from {}",
        rules.len(),
        config.rules_dir.display()
    );

    // 4. Run
    BotRuntime::new(config, rules, args.debug)?.run().await?;
    tracing::info!("Shutting down");
    Ok(())
}
