//! Shared domain types for Chorus.
//!
//! This crate contains the plain data shared across the Chorus workspace:
//! chat messages and platform events, persistent memory rows, persona
//! configuration, LLM request/response shapes, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod platform;
