//! # Strings Module
//!
//! Centralizes user-facing strings so replies stay consistent across remotes.

pub mod messages;
