//! API credential rotation with bounded retry.
//!
//! `CredentialRotator` holds an ordered set of API keys and the provider
//! built for the current one. A rate-limit/quota failure advances to the next
//! key (wrapping around), rebuilds the provider, and retries the same
//! request. The loop is bounded by the number of keys, so a set of K keys
//! makes at most K attempts. Any other error ends the loop immediately.

use std::sync::{Arc, Mutex};

use secrecy::SecretString;

use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::box_provider::BoxLlmProvider;

/// Builds a provider bound to one API credential.
pub type ProviderFactory = Arc<dyn Fn(&SecretString) -> BoxLlmProvider + Send + Sync>;

struct ActiveProvider {
    index: usize,
    provider: Arc<BoxLlmProvider>,
}

/// Round-robin credential holder shared by all calls of one persona.
pub struct CredentialRotator {
    keys: Vec<SecretString>,
    factory: ProviderFactory,
    active: Mutex<ActiveProvider>,
}

impl CredentialRotator {
    /// Create a rotator starting at the first key.
    ///
    /// An empty key set degrades to a single empty credential so the retry
    /// logic stays uniform; every call will then fail at the backend.
    pub fn new(mut keys: Vec<SecretString>, factory: ProviderFactory) -> Self {
        if keys.is_empty() {
            tracing::warn!("No API keys configured; backend calls will fail");
            keys.push(SecretString::from(String::new()));
        }

        let provider = Arc::new(factory(&keys[0]));
        Self {
            keys,
            factory,
            active: Mutex::new(ActiveProvider { index: 0, provider }),
        }
    }

    /// Number of credential slots (at least 1).
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Zero-based index of the credential currently in use.
    pub fn current_index(&self) -> usize {
        self.active.lock().expect("credential rotator lock poisoned").index
    }

    /// Run `request`, rotating credentials on rate-limit errors.
    ///
    /// Makes at most `key_count()` attempts. Returns the last error when every
    /// attempt was rate limited, or the first non-rate-limit error.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let total = self.keys.len();
        let mut attempts = 0;

        loop {
            let (index, provider) = self.current();
            let err = match provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !err.is_rate_limit() {
                return Err(err);
            }

            attempts += 1;
            tracing::warn!(
                attempt = attempts,
                key = index + 1,
                total,
                error = %err,
                "Backend rate limited"
            );

            if attempts >= total || !self.rotate_from(index) {
                return Err(err);
            }
        }
    }

    fn current(&self) -> (usize, Arc<BoxLlmProvider>) {
        let active = self.active.lock().expect("credential rotator lock poisoned");
        (active.index, Arc::clone(&active.provider))
    }

    /// Advance past `observed` unless a concurrent call already did.
    ///
    /// Returns `false` when there is nothing to rotate to.
    fn rotate_from(&self, observed: usize) -> bool {
        let total = self.keys.len();
        if total <= 1 {
            return false;
        }

        let mut active = self.active.lock().expect("credential rotator lock poisoned");
        if active.index == observed {
            let next = (observed + 1) % total;
            active.provider = Arc::new((self.factory)(&self.keys[next]));
            active.index = next;
            tracing::info!("Switching API key ({}/{})", next + 1, total);
        }
        true
    }
}

impl std::fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("keys", &self.keys.len())
            .field("current_index", &self.current_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockLlm;

    fn keys(n: usize) -> Vec<SecretString> {
        (0..n)
            .map(|i| SecretString::from(format!("key-{i}")))
            .collect()
    }

    fn rate_limited() -> LlmError {
        LlmError::Provider {
            message: "RESOURCE_EXHAUSTED: quota exceeded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_uses_first_key() {
        let llm = MockLlm::new();
        llm.push_ok("hello");
        let rotator = CredentialRotator::new(keys(3), llm.factory());

        let response = rotator.complete(&CompletionRequest::chat("hi")).await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(llm.calls_by_key(), vec!["key-0"]);
        assert_eq!(rotator.current_index(), 0);
    }

    #[tokio::test]
    async fn test_rotates_on_rate_limit_then_succeeds() {
        let llm = MockLlm::new();
        llm.push_err(LlmError::RateLimited("429".to_string()));
        llm.push_ok("second key works");
        let rotator = CredentialRotator::new(keys(3), llm.factory());

        let response = rotator.complete(&CompletionRequest::chat("hi")).await.unwrap();
        assert_eq!(response.text, "second key works");
        assert_eq!(llm.calls_by_key(), vec!["key-0", "key-1"]);
        assert_eq!(rotator.current_index(), 1);
    }

    #[tokio::test]
    async fn test_all_rate_limited_makes_exactly_k_attempts() {
        for k in 1..=4 {
            let llm = MockLlm::new();
            llm.set_fallback(Err(rate_limited()));
            let rotator = CredentialRotator::new(keys(k), llm.factory());

            let err = rotator
                .complete(&CompletionRequest::chat("hi"))
                .await
                .unwrap_err();
            assert!(err.is_rate_limit());
            assert_eq!(llm.call_count(), k, "key count {k}");
        }
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_stops_immediately() {
        let llm = MockLlm::new();
        llm.push_err(LlmError::Provider {
            message: "HTTP 500: internal".to_string(),
        });
        let rotator = CredentialRotator::new(keys(3), llm.factory());

        let err = rotator
            .complete(&CompletionRequest::chat("hi"))
            .await
            .unwrap_err();
        assert!(!err.is_rate_limit());
        assert_eq!(llm.call_count(), 1);
        assert_eq!(rotator.current_index(), 0);
    }

    #[tokio::test]
    async fn test_rotation_wraps_around() {
        let llm = MockLlm::new();
        llm.push_err(LlmError::RateLimited("429".to_string()));
        llm.push_ok("a");
        llm.push_err(LlmError::RateLimited("429".to_string()));
        llm.push_ok("b");
        let rotator = CredentialRotator::new(keys(2), llm.factory());

        rotator.complete(&CompletionRequest::chat("1")).await.unwrap();
        rotator.complete(&CompletionRequest::chat("2")).await.unwrap();
        assert_eq!(
            llm.calls_by_key(),
            vec!["key-0", "key-1", "key-1", "key-0"]
        );
        assert_eq!(rotator.current_index(), 0);
    }

    #[tokio::test]
    async fn test_empty_key_set_degrades_to_single_slot() {
        let llm = MockLlm::new();
        llm.set_fallback(Err(rate_limited()));
        let rotator = CredentialRotator::new(Vec::new(), llm.factory());
        assert_eq!(rotator.key_count(), 1);

        assert!(rotator.complete(&CompletionRequest::chat("hi")).await.is_err());
        assert_eq!(llm.calls_by_key(), vec![""]);
    }
}
