//! LLM provider implementations.
//!
//! Contains the Gemini implementation of the [`LlmProvider`] trait defined
//! in `chorus-core`, plus the factory that lets the credential rotator build
//! a provider per API key.
//!
//! [`LlmProvider`]: chorus_core::llm::provider::LlmProvider

pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use chorus_core::llm::box_provider::BoxLlmProvider;
use chorus_core::llm::rotation::{CredentialRotator, ProviderFactory};
use chorus_types::config::BackendConfig;
use chorus_types::llm::LlmError;

use self::gemini::GeminiProvider;

/// Build a [`ProviderFactory`] producing Gemini providers for `config`.
///
/// All providers share one HTTP client.
pub fn gemini_factory(config: &BackendConfig) -> Result<ProviderFactory, LlmError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| LlmError::Provider {
            message: format!("failed to create HTTP client: {e}"),
        })?;
    let model = config.model.clone();
    let base_url = config.base_url.clone();

    Ok(Arc::new(move |key: &SecretString| {
        BoxLlmProvider::new(GeminiProvider::new(
            client.clone(),
            SecretString::from(key.expose_secret().to_string()),
            model.clone(),
            base_url.as_deref(),
        ))
    }))
}

/// Create a credential rotator over `keys` for the configured backend.
pub fn create_rotator(
    config: &BackendConfig,
    keys: Vec<SecretString>,
) -> Result<CredentialRotator, LlmError> {
    Ok(CredentialRotator::new(keys, gemini_factory(config)?))
}
