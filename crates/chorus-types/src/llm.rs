//! LLM request/response types for Chorus.
//!
//! The generative backend is a black box: one text prompt in, text out, with
//! a small set of generation parameters. These types carry that contract
//! between the orchestration layer and concrete providers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-safety blocking threshold requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyThreshold {
    /// Let the provider apply its own defaults.
    #[default]
    ProviderDefault,
    /// Disable content blocking for every harm category.
    BlockNone,
}

/// Request to an LLM provider for a single completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model override; empty means the provider's configured model.
    #[serde(default)]
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub safety: SafetyThreshold,
}

impl CompletionRequest {
    /// Conversational profile: high temperature, long output, permissive
    /// safety. Used for reply decisions, replies, and proactive messages.
    pub fn chat(prompt: impl Into<String>) -> Self {
        Self {
            model: String::new(),
            prompt: prompt.into(),
            temperature: Some(1.1),
            max_output_tokens: Some(4000),
            safety: SafetyThreshold::BlockNone,
        }
    }

    /// Extraction profile: near-deterministic structured output.
    pub fn memory(prompt: impl Into<String>) -> Self {
        Self {
            model: String::new(),
            prompt: prompt.into(),
            temperature: Some(0.1),
            max_output_tokens: None,
            safety: SafetyThreshold::ProviderDefault,
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text; may be empty when the backend produced nothing.
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Errors from LLM provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// Whether this failure is quota/rate-limit class and worth retrying
    /// with another credential.
    ///
    /// Besides the explicit variant, provider messages carrying the backend's
    /// quota markers are classified as rate limits too.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::Provider { message } => {
                message.contains("quota") || message.contains("RESOURCE_EXHAUSTED")
            }
            _ => false,
        }
    }
}

/// Which generation profile a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationProfile {
    Chat,
    Memory,
}

impl GenerationProfile {
    /// Build a request for `prompt` using this profile's parameters.
    pub fn request(self, prompt: impl Into<String>) -> CompletionRequest {
        match self {
            GenerationProfile::Chat => CompletionRequest::chat(prompt),
            GenerationProfile::Memory => CompletionRequest::memory(prompt),
        }
    }
}

impl fmt::Display for GenerationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationProfile::Chat => write!(f, "chat"),
            GenerationProfile::Memory => write!(f, "memory"),
        }
    }
}
