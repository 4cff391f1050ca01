//! Conversation orchestration core and port trait definitions for Chorus.
//!
//! This crate defines the "ports" (`MemoryRepository`, `LlmProvider`,
//! `ChatPlatform`) that the infrastructure layer implements, plus the
//! per-persona engine built on top of them. It depends only on
//! `chorus-types` -- never on `chorus-infra` or any database/IO crate.

pub mod llm;
pub mod memory;
pub mod persona;
pub mod platform;

#[cfg(test)]
pub(crate) mod test_support;
