//! # Bot Context
//!
//! Identity and runtime flags shared (read-mostly) between the remote, the
//! interaction server and the rule engine.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::config::BotConfig;

#[derive(Debug, Default)]
pub struct BotContext {
    pub name: String,
    pub cli: bool,
    pub debug: bool,
    pub interactive_components: bool,
    id: RwLock<String>,
    /// room name -> room id
    rooms: RwLock<HashMap<String, String>>,
}

impl BotContext {
    pub fn new(config: &BotConfig, debug: bool) -> Self {
        Self {
            name: config.name.clone(),
            cli: config.cli,
            debug,
            interactive_components: config.interactive_components,
            ..Default::default()
        }
    }

    /// The bot's own user id on the remote (empty until the remote authenticated).
    pub fn id(&self) -> String {
        self.id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_id(&self, id: &str) {
        *self.id.write().unwrap_or_else(|e| e.into_inner()) = id.to_string();
    }

    pub fn set_rooms(&self, rooms: HashMap<String, String>) {
        *self.rooms.write().unwrap_or_else(|e| e.into_inner()) = rooms;
    }

    /// Reverse lookup used when translating inbound events.
    pub fn room_name(&self, id: &str) -> Option<String> {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(_, room_id)| room_id.as_str() == id)
            .map(|(name, _)| name.clone())
    }
}
