//! Generative backend abstractions for Chorus.
//!
//! - `LlmProvider`: RPITIT trait for concrete backend implementations
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `CredentialRotator`: key rotation and bounded retry under rate limits

pub mod box_provider;
pub mod provider;
pub mod rotation;
