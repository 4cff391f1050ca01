//! GeminiProvider -- concrete [`LlmProvider`] implementation for Google Gemini.
//!
//! Sends single-turn prompts to `/v1beta/models/{model}:generateContent`.
//! The API key is wrapped in [`secrecy::SecretString`] and only exposed when
//! building the request header.

use secrecy::{ExposeSecret, SecretString};

use chorus_core::llm::provider::LlmProvider;
use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError, SafetyThreshold};

use super::types::{
    Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    HARM_CATEGORIES, Part, SafetySetting,
};

/// Default public endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini LLM provider bound to one API key.
///
/// Providers are cheap: the `reqwest::Client` is shared, so the credential
/// rotator can build a new one for every key switch.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    fn resolve_model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        }
    }
}

/// Convert a generic [`CompletionRequest`] into a Gemini request body.
pub fn to_gemini_request(request: &CompletionRequest) -> GenerateContentRequest {
    let generation_config = (request.temperature.is_some() || request.max_output_tokens.is_some())
        .then(|| GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        });

    let safety_settings = match request.safety {
        SafetyThreshold::BlockNone => HARM_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category: category.to_string(),
                threshold: "BLOCK_NONE".to_string(),
            })
            .collect(),
        SafetyThreshold::ProviderDefault => Vec::new(),
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(request.prompt.clone()),
            }],
        }],
        generation_config,
        safety_settings,
    }
}

/// Classify a non-success HTTP response.
///
/// 429 and quota-exhaustion bodies become [`LlmError::RateLimited`] so the
/// rotator switches keys; 401/403 are authentication failures.
pub fn map_error_status(status: u16, body: &str) -> LlmError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.to_string(), String::new()),
    };

    if status == 429 || api_status == "RESOURCE_EXHAUSTED" || body.contains("RESOURCE_EXHAUSTED")
    {
        return LlmError::RateLimited(message);
    }

    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        400 => LlmError::InvalidRequest(message),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = self.resolve_model(request).to_string();
        let body = to_gemini_request(request);

        let response = self
            .client
            .post(self.url(&model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status.as_u16(), &error_body));
        }

        let gemini_resp: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        let text = gemini_resp.text();
        if text.is_empty() {
            tracing::debug!(
                finish_reason = ?gemini_resp.finish_reason(),
                "Gemini returned no text"
            );
        }

        Ok(CompletionResponse {
            text,
            model: gemini_resp.model_version.clone().unwrap_or(model),
            finish_reason: gemini_resp.finish_reason(),
        })
    }
}
