//! Two-tier persona memory.
//!
//! `MemoryRepository` is the port for the persistent, persona-namespaced
//! store (implemented in chorus-infra). `ShortTermMemory` is the in-process
//! ring buffer of recent messages per channel. `extraction` parses the
//! structured JSON the backend returns from extraction prompts.

pub mod extraction;
pub mod short_term;
pub mod store;
