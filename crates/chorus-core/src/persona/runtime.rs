//! Persona runtime -- the per-persona composition root.
//!
//! Wires one platform connection to one orchestrator and drives the debounce
//! engine from an event stream and the autonomy scheduler on timers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use chorus_types::config::{PersonaConfig, RuntimeSettings};
use chorus_types::error::PlatformError;
use chorus_types::platform::IncomingMessage;

use crate::llm::rotation::CredentialRotator;
use crate::memory::short_term::ShortTermMemory;
use crate::memory::store::MemoryRepository;
use crate::platform::ChatPlatform;

use super::autonomy::{AutonomyScheduler, AutonomySettings};
use super::debounce::{DebounceEngine, IncomingOutcome, ReplySettings};
use super::orchestrator::ConversationOrchestrator;

pub struct PersonaRuntime<P: ChatPlatform, R: MemoryRepository + 'static> {
    name: String,
    platform: Arc<P>,
    short_term: ShortTermMemory,
    engine: Arc<DebounceEngine<P, R>>,
    scheduler: Arc<AutonomyScheduler<P, R>>,
}

impl<P: ChatPlatform, R: MemoryRepository + 'static> PersonaRuntime<P, R> {
    /// Build a persona from its configuration.
    ///
    /// `store` is shared between personas; memory is namespaced by the
    /// persona name. Short-term memory is private to this persona.
    pub fn new(
        persona: &PersonaConfig,
        runtime: &RuntimeSettings,
        platform: Arc<P>,
        store: Arc<R>,
        rotator: CredentialRotator,
    ) -> Self {
        let name = persona.name().to_string();
        let short_term = ShortTermMemory::new(runtime.history_limit);
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            name.clone(),
            persona.character.base_prompt.clone(),
            store,
            short_term.clone(),
            rotator,
        ));
        let engine = Arc::new(DebounceEngine::new(
            Arc::clone(&platform),
            Arc::clone(&orchestrator),
            short_term.clone(),
            ReplySettings::from_config(persona, runtime),
        ));
        let scheduler = Arc::new(AutonomyScheduler::new(
            Arc::clone(&platform),
            orchestrator,
            short_term.clone(),
            AutonomySettings::from_config(persona, runtime),
        ));

        Self {
            name,
            platform,
            short_term,
            engine,
            scheduler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    /// Process a platform message on its own task.
    pub fn handle_event(&self, message: IncomingMessage) -> JoinHandle<IncomingOutcome> {
        spawn_incoming(&self.engine, message)
    }

    /// Feed every message from `events` into the debounce engine until the
    /// sender closes or `cancel` fires. Each message is handled on its own task
    /// so a slow willingness check never stalls the stream.
    pub fn run_events(
        &self,
        mut events: mpsc::Receiver<IncomingMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let name = self.name.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = events.recv() => match next {
                        Some(message) => {
                            spawn_incoming(&engine, message);
                        }
                        None => {
                            tracing::info!(persona = %name, "Event source closed");
                            break;
                        }
                    },
                }
            }
        })
    }

    /// Re-process a historical message as if newly eligible, bypassing every
    /// willingness check.
    #[tracing::instrument(name = "trigger", skip(self), fields(persona = %self.name))]
    pub async fn trigger(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<IncomingOutcome, PlatformError> {
        let message = self.platform.fetch_message(channel_id, message_id).await?;
        tracing::info!(author = %message.author.username, "Forcing reply");
        Ok(self.engine.on_incoming(message, true).await)
    }

    /// Start the extraction jobs and, when enabled, the proactive loop.
    pub fn start_background(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.scheduler.start(cancel)
    }
}

fn spawn_incoming<P: ChatPlatform, R: MemoryRepository + 'static>(
    engine: &Arc<DebounceEngine<P, R>>,
    message: IncomingMessage,
) -> JoinHandle<IncomingOutcome> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move { engine.on_incoming(message, false).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chorus_types::config::AppConfig;

    use crate::test_support::{
        InMemoryRepository, MockLlm, MockPlatform, PlatformCall, dm_channel, incoming,
        server_channel,
    };

    const CONFIG: &str = r#"
[[personas]]
token_env = "LUNA_TOKEN"
always_reply = false

[personas.character]
name = "Luna"
base_prompt = "You are Luna."
"#;

    fn runtime(llm: &MockLlm, platform: &MockPlatform) -> PersonaRuntime<MockPlatform, InMemoryRepository> {
        let config: AppConfig = toml::from_str(CONFIG).unwrap();
        PersonaRuntime::new(
            &config.personas[0],
            &config.runtime,
            Arc::new(platform.clone()),
            Arc::new(InMemoryRepository::new()),
            llm.rotator(2),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_forces_reply() {
        let llm = MockLlm::new();
        llm.push_ok("sorry, missed this!");
        let platform = MockPlatform::new();
        platform.add_message(incoming(server_channel("c1"), "old", "u1", "mint", "luna??"));
        let rt = runtime(&llm, &platform);

        let outcome = rt.trigger("c1", "old").await.unwrap();
        assert_eq!(outcome, IncomingOutcome::Buffered { new_buffer: true });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(llm.call_count(), 1);
        assert_eq!(
            platform.sent(),
            vec![PlatformCall::Send {
                channel_id: "c1".to_string(),
                content: "sorry, missed this!".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_trigger_unknown_message_errors() {
        let llm = MockLlm::new();
        let platform = MockPlatform::new();
        let rt = runtime(&llm, &platform);

        let err = rt.trigger("c1", "missing").await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_event_records_message() {
        let llm = MockLlm::new();
        let platform = MockPlatform::new();
        let rt = runtime(&llm, &platform);
        assert_eq!(rt.name(), "Luna");

        let msg = incoming(server_channel("c1"), "m1", "u1", "mint", "just chatting");
        let outcome = rt.handle_event(msg).await.unwrap();
        assert_eq!(outcome, IncomingOutcome::NotAddressed);
        assert_eq!(rt.short_term().recent("c1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_events_replies_to_streamed_dm() {
        let llm = MockLlm::new();
        llm.push_ok("YES");
        llm.push_ok("hey mint");
        let platform = MockPlatform::new();
        let rt = runtime(&llm, &platform);

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = rt.run_events(rx, cancel.clone());

        tx.send(incoming(dm_channel("d1"), "m1", "u1", "mint", "you around?"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(llm.call_count(), 2);
        assert_eq!(
            platform.sent(),
            vec![PlatformCall::Send {
                channel_id: "d1".to_string(),
                content: "hey mint".to_string(),
            }]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_events_stops_when_sender_drops() {
        let llm = MockLlm::new();
        let platform = MockPlatform::new();
        let rt = runtime(&llm, &platform);

        let (tx, rx) = mpsc::channel(8);
        let handle = rt.run_events(rx, CancellationToken::new());
        tx.send(incoming(server_channel("c1"), "m1", "u1", "mint", "just chatting"))
            .await
            .unwrap();
        drop(tx);

        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rt.short_term().recent("c1").len(), 1);
        assert!(platform.calls().is_empty());
    }
}
