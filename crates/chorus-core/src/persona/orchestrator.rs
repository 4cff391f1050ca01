//! AI orchestration layer for one persona.
//!
//! `ConversationOrchestrator` turns conversation context into decisions,
//! replies, extracted memories and proactive messages. Every public method
//! returns a usable value: backend and store failures are logged and mapped to
//! a documented safe default so they never reach message-handling control
//! flow.

use std::sync::Arc;

use chorus_types::llm::{GenerationProfile, LlmError};
use chorus_types::memory::{RelationshipEntry, gossip_entry, persona_identity};
use chorus_types::message::{ChatMessage, MessageRole};

use crate::llm::rotation::CredentialRotator;
use crate::memory::extraction;
use crate::memory::short_term::ShortTermMemory;
use crate::memory::store::MemoryRepository;

use super::prompt::{self, ReplyContext};

/// History longer than this is truncated before building the reply prompt.
pub const HISTORY_WINDOW: usize = 30;

/// Messages pulled from other channels as flavor context.
pub const CROSS_CHANNEL_LIMIT: usize = 5;

/// Extraction is skipped for batches smaller than this.
pub const MIN_EXTRACTION_BATCH: usize = 3;

/// Gossip entries offered to the proactive prompt.
pub const PROACTIVE_GOSSIP_LIMIT: usize = 10;

/// Answer meaning "do not post anything" in proactive generation.
const DECLINE_TOKEN: &str = "NO";

pub struct ConversationOrchestrator<R: MemoryRepository> {
    persona: String,
    base_prompt: String,
    store: Arc<R>,
    short_term: ShortTermMemory,
    rotator: CredentialRotator,
}

impl<R: MemoryRepository> ConversationOrchestrator<R> {
    pub fn new(
        persona: impl Into<String>,
        base_prompt: impl Into<String>,
        store: Arc<R>,
        short_term: ShortTermMemory,
        rotator: CredentialRotator,
    ) -> Self {
        Self {
            persona: persona.into(),
            base_prompt: base_prompt.into(),
            store,
            short_term,
            rotator,
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Ask the backend whether the persona wants to answer.
    ///
    /// Defaults to `true` on any failure so a message the caller considered
    /// worth asking about is never silently dropped.
    #[tracing::instrument(
        name = "decide_should_reply",
        skip(self, speaker, content, history),
        fields(persona = %self.persona, speaker = %speaker)
    )]
    pub async fn decide_should_reply(
        &self,
        speaker: &str,
        content: &str,
        history: &[ChatMessage],
    ) -> bool {
        let prompt = prompt::should_reply(&self.persona, content, history);
        match self.generate(GenerationProfile::Chat, prompt).await {
            Ok(answer) => {
                let wants = answer.to_uppercase().contains("YES");
                tracing::debug!(answer = %answer.trim(), wants, "Should-reply decision");
                wants
            }
            Err(e) => {
                tracing::error!(error = %e, "Should-reply decision failed; defaulting to reply");
                true
            }
        }
    }

    /// Compose a reply to `username` using memory and recent history.
    ///
    /// Returns the trimmed backend text, or an empty string on failure.
    #[tracing::instrument(
        name = "generate_response",
        skip(self, display_name, history),
        fields(persona = %self.persona, user_id = %user_id, history_len = history.len())
    )]
    pub async fn generate_response(
        &self,
        display_name: &str,
        username: &str,
        user_id: &str,
        history: &[ChatMessage],
        location: &str,
    ) -> String {
        let persona = self.persona.as_str();
        let (user_memory, global_memory, facts, relationships) = tokio::join!(
            self.store.get_user_memory(persona, user_id),
            self.store.get_global(persona),
            self.store.get_facts(persona),
            self.store.get_relationships(persona, user_id),
        );
        let user_memory = or_empty(user_memory, "user memory");
        let global_memory = or_empty(global_memory, "global memory");
        let facts = or_empty(facts, "facts");
        let relationships = or_empty(relationships, "relationships");

        let filtered = truncate_history(history, persona);
        let other_conversations = self.other_conversations(history);

        let prompt = prompt::reply(&ReplyContext {
            base_prompt: &self.base_prompt,
            location,
            display_name,
            username,
            global_memory: &global_memory,
            user_memory: &user_memory,
            facts: &facts,
            relationships: &relationships,
            other_conversations: &other_conversations,
            history: &filtered,
        });

        match self.generate(GenerationProfile::Chat, prompt).await {
            Ok(text) => {
                if text.is_empty() {
                    tracing::warn!("Backend returned an empty reply");
                }
                text
            }
            Err(e) => {
                tracing::error!(error = %e, "Reply generation failed");
                String::new()
            }
        }
    }

    /// Extract shareable gossip from a batch and store it as global memory.
    ///
    /// Returns how many gossip lines were stored.
    #[tracing::instrument(
        name = "extract_gossip",
        skip(self, batch),
        fields(persona = %self.persona, message_count = batch.len())
    )]
    pub async fn extract_gossip(&self, batch: &[ChatMessage]) -> usize {
        if batch.len() < MIN_EXTRACTION_BATCH {
            return 0;
        }

        let prompt = prompt::extract_gossip(&self.persona, batch);
        let raw = match self.generate(GenerationProfile::Memory, prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Gossip extraction failed");
                return 0;
            }
        };

        let mut stored = 0;
        for fact in extraction::parse_gossip(&raw) {
            match self.store.add_global(&self.persona, &gossip_entry(&fact)).await {
                Ok(()) => {
                    stored += 1;
                    tracing::debug!(fact = %fact, "Stored gossip");
                }
                Err(e) => tracing::warn!(error = %e, "Failed to store gossip"),
            }
        }
        stored
    }

    /// Extract per-user facts and relationships from a batch.
    ///
    /// Relationship identities equal to the persona name are stored under the
    /// persona's synthetic id. Returns how many rows were written.
    #[tracing::instrument(
        name = "extract_user_memories",
        skip(self, batch),
        fields(persona = %self.persona, message_count = batch.len())
    )]
    pub async fn extract_user_memories(&self, batch: &[ChatMessage]) -> usize {
        if batch.len() < MIN_EXTRACTION_BATCH {
            return 0;
        }

        let prompt = prompt::extract_user_memories(&self.persona, batch);
        let raw = match self.generate(GenerationProfile::Memory, prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "User memory extraction failed");
                return 0;
            }
        };

        let extracted = extraction::parse_user_memories(&raw);
        let mut stored = 0;

        for fact in &extracted.user_facts {
            match self
                .store
                .set_user_memory(&self.persona, &fact.user_id, &fact.key, &fact.value)
                .await
            {
                Ok(()) => {
                    stored += 1;
                    tracing::debug!(user_id = %fact.user_id, key = %fact.key, "Stored user fact");
                }
                Err(e) => tracing::warn!(error = %e, "Failed to store user fact"),
            }
        }

        for rel in &extracted.relationships {
            let entry = RelationshipEntry {
                character_id: self.persona.clone(),
                user_id_1: self.identity(&rel.user_id_1),
                user_id_2: self.identity(&rel.user_id_2),
                relationship_type: rel.relationship_type.clone(),
                description: rel.description.clone(),
            };
            match self.store.add_relationship(&entry).await {
                Ok(()) => {
                    stored += 1;
                    tracing::debug!(
                        user_id_1 = %entry.user_id_1,
                        user_id_2 = %entry.user_id_2,
                        relationship_type = %entry.relationship_type,
                        "Stored relationship"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "Failed to store relationship"),
            }
        }

        stored
    }

    /// Ask for an unprompted message. `None` when the persona declines or
    /// anything fails.
    #[tracing::instrument(
        name = "generate_proactive_message",
        skip(self),
        fields(persona = %self.persona)
    )]
    pub async fn generate_proactive_message(&self, time_label: &str) -> Option<String> {
        let gossip: Vec<String> = match self.store.get_global(&self.persona).await {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| e.is_gossip())
                .take(PROACTIVE_GOSSIP_LIMIT)
                .map(|e| e.content)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load gossip for proactive message");
                Vec::new()
            }
        };

        let prompt = prompt::proactive(&self.persona, time_label, &gossip);
        match self.generate(GenerationProfile::Chat, prompt).await {
            Ok(text) if text.is_empty() || text.eq_ignore_ascii_case(DECLINE_TOKEN) => None,
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(error = %e, "Proactive generation failed");
                None
            }
        }
    }

    async fn generate(&self, profile: GenerationProfile, prompt: String) -> Result<String, LlmError> {
        tracing::trace!(%profile, prompt_len = prompt.len(), "Calling backend");
        let response = self.rotator.complete(&profile.request(prompt)).await?;
        Ok(response.text.trim().to_string())
    }

    /// Up to [`CROSS_CHANNEL_LIMIT`] recent messages from other conversations.
    fn other_conversations(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut others: Vec<ChatMessage> = self
            .short_term
            .recent_across_channels(CROSS_CHANNEL_LIMIT)
            .into_iter()
            .filter(|m| !history.iter().any(|h| h.id == m.id))
            .collect();
        let skip = others.len().saturating_sub(CROSS_CHANNEL_LIMIT);
        others.drain(..skip);
        others
    }

    fn identity(&self, id: &str) -> String {
        if id == self.persona {
            persona_identity(&self.persona)
        } else {
            id.to_string()
        }
    }
}

/// Keep the last [`HISTORY_WINDOW`] entries verbatim; from the older
/// remainder keep only the persona's own lines.
pub fn truncate_history(history: &[ChatMessage], persona: &str) -> Vec<ChatMessage> {
    if history.len() <= HISTORY_WINDOW {
        return history.to_vec();
    }

    let split = history.len() - HISTORY_WINDOW;
    history[..split]
        .iter()
        .filter(|m| m.role == MessageRole::Model || m.author_name.contains(persona))
        .chain(history[split..].iter())
        .cloned()
        .collect()
}

fn or_empty<T>(result: Result<Vec<T>, chorus_types::error::RepositoryError>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load {what}; continuing without it");
        Vec::new()
    })
}
