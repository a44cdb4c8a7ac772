//! # Infrastructure Layer
//!
//! Handles interactions with external systems: chat platforms and child processes.
//! Implements the `Remote` trait from the domain layer for each supported backend.

pub mod cli;
pub mod matrix;
pub mod process;
pub mod slack;
