//! # Application Layer
//!
//! Orchestration of the bot: template resolution, command tokenizing, rule
//! loading and matching, and the runtime that wires a remote to the engine.

pub mod engine;
pub mod loader;
pub mod logging;
pub mod runtime;
pub mod substitution;
pub mod tokenizer;
