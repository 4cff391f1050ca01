//! Per-persona conversation engine.
//!
//! - `orchestrator`: prompts, backend calls and memory extraction
//! - `debounce`: per-channel buffering and reply delivery
//! - `autonomy`: periodic extraction and proactive messaging
//! - `runtime`: composition root wiring one persona together

pub mod autonomy;
pub mod debounce;
pub mod orchestrator;
pub mod prompt;
pub mod runtime;
