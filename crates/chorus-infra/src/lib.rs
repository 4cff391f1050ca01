//! Infrastructure layer for Chorus.
//!
//! Contains implementations of the port traits defined in `chorus-core`:
//! SQLite persona memory, the Gemini LLM provider, the Discord REST
//! platform adapter, and configuration/credential loading.

pub mod config;
pub mod discord;
pub mod llm;
pub mod sqlite;
