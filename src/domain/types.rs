//! # Domain Types
//!
//! Messages, rules and script results exchanged between the remotes, the rule engine
//! and the process runner.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a message came from (and where its reply goes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Direct,
    Channel,
    PrivateChannel,
    #[default]
    Unknown,
}

impl MessageType {
    /// Types a remote is able to deliver.
    pub fn is_deliverable(self) -> bool {
        matches!(
            self,
            MessageType::Direct | MessageType::Channel | MessageType::PrivateChannel
        )
    }
}

/// A single chat message flowing through the bot.
///
/// `channel_id` + `timestamp` identify the message on the remote platform and are
/// never rewritten once the message has been ingested.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub input: String,
    pub output: String,
    pub timestamp: String,
    pub thread_timestamp: Option<String>,
    pub vars: HashMap<String, String>,
    pub start_time: i64,
    pub end_time: i64,
}

impl Message {
    pub fn new(message_type: MessageType, channel_id: &str, timestamp: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            channel_id: channel_id.to_string(),
            timestamp: timestamp.to_string(),
            start_time: message_timestamp(),
            ..Default::default()
        }
    }

    /// Reply to this message: same target, fresh id, no output yet.
    pub fn reply(&self) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            output: String::new(),
            end_time: 0,
            ..self.clone()
        }
    }
}

/// Current unix time in seconds.
pub fn message_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The executable part of a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Action {
    #[serde(default)]
    pub name: String,
    pub cmd: String,
    /// Seconds; 0 means "use the default".
    #[serde(default)]
    pub timeout: u64,
}

/// A button offered by an interactive message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Button {
    pub text: String,
    pub value: String,
}

/// A configured trigger/action pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub hear: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub remove_reaction: String,
    #[serde(default)]
    pub format_output: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
    /// Rule-level default for actions that don't set their own timeout.
    #[serde(default)]
    pub timeout: u64,
}

fn default_active() -> bool {
    true
}

pub type RuleMap = HashMap<String, Rule>;

/// Normalized outcome of an external command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptResult {
    pub status: i32,
    pub output: String,
}

impl Default for ScriptResult {
    fn default() -> Self {
        // Generic failure until the runner says otherwise
        Self {
            status: 1,
            output: String::new(),
        }
    }
}
