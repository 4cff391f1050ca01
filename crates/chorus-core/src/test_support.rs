//! In-crate test doubles for the core's ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use chorus_types::error::{PlatformError, RepositoryError};
use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError};
use chorus_types::memory::{FactEntry, GlobalMemoryEntry, RelationshipEntry, UserMemoryEntry};
use chorus_types::platform::{ChannelInfo, ChannelKind, IncomingMessage, PlatformUser};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::LlmProvider;
use crate::llm::rotation::{CredentialRotator, ProviderFactory};
use crate::memory::store::{FACTS_LIMIT, GLOBAL_MEMORY_LIMIT, MemoryRepository};
use crate::platform::ChatPlatform;

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockLlmState {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Mutex<Option<Result<String, LlmError>>>,
    calls: Mutex<Vec<(String, CompletionRequest)>>,
}

/// Scripted backend shared by every provider the factory builds.
///
/// Responses are consumed in order; once the script runs out the fallback
/// (default: empty text) is returned.
#[derive(Clone, Default)]
pub struct MockLlm {
    state: Arc<MockLlmState>,
}

struct MockProvider {
    key: String,
    state: Arc<MockLlmState>,
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((self.key.clone(), request.clone()));

        let next = self.state.script.lock().unwrap().pop_front();
        let result = match next {
            Some(r) => r,
            None => self
                .state
                .fallback
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(String::new())),
        };
        result.map(|text| CompletionResponse {
            text,
            model: "mock-model".to_string(),
            finish_reason: Some("STOP".to_string()),
        })
    }
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, text: &str) {
        self.state.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self, err: LlmError) {
        self.state.script.lock().unwrap().push_back(Err(err));
    }

    pub fn set_fallback(&self, result: Result<String, LlmError>) {
        *self.state.fallback.lock().unwrap() = Some(result);
    }

    pub fn factory(&self) -> ProviderFactory {
        let state = Arc::clone(&self.state);
        Arc::new(move |key: &SecretString| {
            BoxLlmProvider::new(MockProvider {
                key: key.expose_secret().to_string(),
                state: Arc::clone(&state),
            })
        })
    }

    /// A rotator over `n` keys named `key-0..key-n`.
    pub fn rotator(&self, n: usize) -> CredentialRotator {
        let keys = (0..n)
            .map(|i| SecretString::from(format!("key-{i}")))
            .collect();
        CredentialRotator::new(keys, self.factory())
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    pub fn calls_by_key(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, req)| req.prompt.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, req)| req.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Send { channel_id: String, content: String },
    Reply { channel_id: String, message_id: String, content: String },
    Typing { channel_id: String },
}

#[derive(Default)]
struct MockPlatformState {
    calls: Mutex<Vec<(Instant, PlatformCall)>>,
    channels: Mutex<HashMap<String, ChannelInfo>>,
    messages: Mutex<HashMap<(String, String), IncomingMessage>>,
    fail_replies: AtomicBool,
    fail_sends: AtomicBool,
    fail_typing: AtomicBool,
}

/// Platform double that records every outbound call with its (virtual) time.
#[derive(Clone)]
pub struct MockPlatform {
    user: PlatformUser,
    state: Arc<MockPlatformState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            user: PlatformUser::new("bot-1", "Luna"),
            state: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, PlatformCall)> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Outbound message calls only (no typing).
    pub fn sent(&self) -> Vec<PlatformCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, PlatformCall::Typing { .. }))
            .collect()
    }

    pub fn typing_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, PlatformCall::Typing { .. }))
            .count()
    }

    pub fn add_channel(&self, channel: ChannelInfo) {
        self.state
            .channels
            .lock()
            .unwrap()
            .insert(channel.id.clone(), channel);
    }

    pub fn add_message(&self, message: IncomingMessage) {
        self.state
            .messages
            .lock()
            .unwrap()
            .insert((message.channel.id.clone(), message.id.clone()), message);
    }

    pub fn fail_replies(&self) {
        self.state.fail_replies.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.state.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn fail_typing(&self) {
        self.state.fail_typing.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: PlatformCall) {
        self.state.calls.lock().unwrap().push((Instant::now(), call));
    }
}

impl ChatPlatform for MockPlatform {
    fn self_user(&self) -> &PlatformUser {
        &self.user
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String, PlatformError> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("send failed".to_string()));
        }
        self.record(PlatformCall::Send {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(format!("sent-{}", self.calls().len()))
    }

    async fn reply_to(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        if self.state.fail_replies.load(Ordering::SeqCst) {
            return Err(PlatformError::Status {
                status: 400,
                body: "Unknown message".to_string(),
            });
        }
        self.record(PlatformCall::Reply {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            content: content.to_string(),
        });
        Ok(format!("sent-{}", self.calls().len()))
    }

    async fn send_typing(&self, channel_id: &str) -> Result<(), PlatformError> {
        if self.state.fail_typing.load(Ordering::SeqCst) {
            return Err(PlatformError::Unauthorized);
        }
        self.record(PlatformCall::Typing {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError> {
        self.state
            .channels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<IncomingMessage, PlatformError> {
        self.state
            .messages
            .lock()
            .unwrap()
            .get(&(channel_id.to_string(), message_id.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("message {message_id}")))
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    global: Vec<GlobalMemoryEntry>,
    user: Vec<UserMemoryEntry>,
    facts: Vec<FactEntry>,
    relationships: Vec<RelationshipEntry>,
}

/// `MemoryRepository` over plain vectors with the same uniqueness rules as
/// the SQLite store.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a query error.
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("store offline".to_string()));
        }
        Ok(())
    }

    pub fn global_contents(&self, character_id: &str) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .global
            .iter()
            .filter(|e| e.character_id == character_id)
            .map(|e| e.content.clone())
            .collect()
    }

    pub fn user_entries(&self, character_id: &str) -> Vec<UserMemoryEntry> {
        self.tables
            .lock()
            .unwrap()
            .user
            .iter()
            .filter(|e| e.character_id == character_id)
            .cloned()
            .collect()
    }

    pub fn relationship_entries(&self, character_id: &str) -> Vec<RelationshipEntry> {
        self.tables
            .lock()
            .unwrap()
            .relationships
            .iter()
            .filter(|e| e.character_id == character_id)
            .cloned()
            .collect()
    }
}

impl MemoryRepository for InMemoryRepository {
    async fn add_global(&self, character_id: &str, content: &str) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let exists = tables
            .global
            .iter()
            .any(|e| e.character_id == character_id && e.content == content);
        if !exists {
            tables.global.push(GlobalMemoryEntry {
                character_id: character_id.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn get_global(&self, character_id: &str) -> Result<Vec<GlobalMemoryEntry>, RepositoryError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .global
            .iter()
            .rev()
            .filter(|e| e.character_id == character_id)
            .take(GLOBAL_MEMORY_LIMIT as usize)
            .cloned()
            .collect())
    }

    async fn set_user_memory(
        &self,
        character_id: &str,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        tables
            .user
            .retain(|e| !(e.character_id == character_id && e.user_id == user_id && e.key == key));
        tables.user.push(UserMemoryEntry {
            character_id: character_id.to_string(),
            user_id: user_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_user_memory(
        &self,
        character_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserMemoryEntry>, RepositoryError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .user
            .iter()
            .filter(|e| e.character_id == character_id && e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_fact(&self, character_id: &str, topic: &str, content: &str) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        tables
            .facts
            .retain(|f| !(f.character_id == character_id && f.topic == topic));
        tables.facts.push(FactEntry {
            character_id: character_id.to_string(),
            topic: topic.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn get_facts(&self, character_id: &str) -> Result<Vec<FactEntry>, RepositoryError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .facts
            .iter()
            .filter(|f| f.character_id == character_id)
            .take(FACTS_LIMIT as usize)
            .cloned()
            .collect())
    }

    async fn add_relationship(&self, relationship: &RelationshipEntry) -> Result<(), RepositoryError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        tables.relationships.retain(|r| {
            !(r.character_id == relationship.character_id
                && r.user_id_1 == relationship.user_id_1
                && r.user_id_2 == relationship.user_id_2
                && r.relationship_type == relationship.relationship_type)
        });
        tables.relationships.push(relationship.clone());
        Ok(())
    }

    async fn get_relationships(
        &self,
        character_id: &str,
        user_id: &str,
    ) -> Result<Vec<RelationshipEntry>, RepositoryError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .relationships
            .iter()
            .filter(|r| {
                r.character_id == character_id && (r.user_id_1 == user_id || r.user_id_2 == user_id)
            })
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn server_channel(id: &str) -> ChannelInfo {
    ChannelInfo {
        id: id.to_string(),
        kind: ChannelKind::Server,
        name: Some("general".to_string()),
        guild_id: Some("guild-1".to_string()),
        guild_name: Some("Cafe".to_string()),
        last_message_at: None,
    }
}

pub fn dm_channel(id: &str) -> ChannelInfo {
    ChannelInfo {
        id: id.to_string(),
        kind: ChannelKind::Dm,
        name: None,
        guild_id: None,
        guild_name: None,
        last_message_at: None,
    }
}

pub fn incoming(channel: ChannelInfo, id: &str, author_id: &str, author: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        channel,
        author: PlatformUser::new(author_id, author),
        content: content.to_string(),
        mentions: Vec::new(),
        reference_message_id: None,
        timestamp: None,
    }
}
