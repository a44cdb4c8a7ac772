//! # Slack Remote
//!
//! Slack implementation of the `Remote` trait: Web API client, socket-mode and
//! events-API ingestion, request signing and the interactive components server.

pub mod api;
pub mod events;
pub mod interactions;
pub mod remote;
pub mod signature;
pub mod socket;

use regex::Regex;
use std::sync::LazyLock;

pub use remote::SlackRemote;

/// Slack's hard limit on message text.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

static VALID_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/[A-Za-z0-9_.\-]+)+/?$").expect("valid path regex"));

/// Whether `path` is an absolute route made of `[A-Za-z0-9_.-]` segments.
/// Callback paths come from config and axum panics on anything else.
pub fn is_valid_path(path: &str) -> bool {
    VALID_PATH.is_match(path)
}
