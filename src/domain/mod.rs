//! # Domain Layer
//!
//! Core definitions, types, and traits shared by every chat backend.
//! Independent of any specific platform SDK, serving as the contract for the other layers.

pub mod bot;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;
