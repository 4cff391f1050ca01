//! LlmProvider trait definition.
//!
//! The generative backend is a black box: one prompt in, text out. This is
//! the abstraction every concrete backend implements.

use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for generative-text backends (Gemini, test doubles, ...).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). One provider
/// instance is bound to exactly one API credential; `CredentialRotator`
/// builds a fresh instance when it switches keys.
///
/// Implementations live in chorus-infra (e.g., `GeminiProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
