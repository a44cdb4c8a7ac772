//! # Configuration
//!
//! Structs for the bot configuration file (`config/bot.yml`).
//! Loading and `${ENV}` expansion live in `application::loader`.

use serde::Deserialize;
use std::path::PathBuf;

/// Main bot configuration structure.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    #[serde(default)]
    pub chat_application: ChatApplication,
    /// Non-networked interactive mode (stdin/stdout).
    #[serde(default)]
    pub cli: bool,
    #[serde(default)]
    pub interactive_components: bool,
    /// Capacity of the inbound message channel.
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
    /// Default timeout (seconds) for exec actions.
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout: u64,
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatApplication {
    #[default]
    Slack,
    Matrix,
}

fn default_message_buffer() -> usize {
    256
}

fn default_exec_timeout() -> u64 {
    20
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("config/rules")
}

/// Specific configuration for the Slack service.
#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default)]
    pub token: String,
    /// App-level token; enables socket mode.
    #[serde(default)]
    pub app_token: String,
    /// Enables the events API (callback mode) and interactive components.
    #[serde(default)]
    pub signing_secret: String,
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
    #[serde(default = "default_events_path")]
    pub events_callback_path: String,
    #[serde(default)]
    pub interactions_callback_path: String,
    #[serde(default = "default_interactions_port")]
    pub interactions_port: u16,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            app_token: String::new(),
            signing_secret: String::new(),
            listener_port: default_listener_port(),
            events_callback_path: default_events_path(),
            interactions_callback_path: String::new(),
            interactions_port: default_interactions_port(),
            api_url: default_api_url(),
        }
    }
}

fn default_listener_port() -> u16 {
    3000
}

fn default_interactions_port() -> u16 {
    4000
}

fn default_events_path() -> String {
    "/slack_events/v1/events".to_string()
}

fn default_api_url() -> String {
    "https://slack.com/api".to_string()
}

/// Specific configuration for the Matrix service.
#[derive(Debug, Deserialize, Clone)]
pub struct MatrixConfig {
    pub homeserver: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file (appended to, never rotated).
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
