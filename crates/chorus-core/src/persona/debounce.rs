//! Per-channel message debouncing.
//!
//! `DebounceEngine` decides whether an incoming message deserves a reply and,
//! if so, parks it in its channel's buffer. Each new message resets the
//! buffer's quiet-window timer; when the window elapses without another
//! eligible message the buffer is flushed into exactly one reply pass, sent
//! in parts with human-like pauses.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::task::JoinHandle;
use uuid::Uuid;

use chorus_types::config::{DelayRange, PersonaConfig, RuntimeSettings};
use chorus_types::message::ChatMessage;
use chorus_types::platform::IncomingMessage;

use crate::memory::short_term::ShortTermMemory;
use crate::memory::store::MemoryRepository;
use crate::platform::ChatPlatform;

use super::orchestrator::ConversationOrchestrator;

/// In-band token the backend uses to split a reply into separate messages.
pub const SPLIT_TOKEN: &str = "[SPLIT]";

/// Reply behavior of one persona.
#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub always_reply: bool,
    pub use_reply_format: bool,
    pub reply_delay: DelayRange,
    pub typing_delay: DelayRange,
    pub allowed_dms: Vec<String>,
    pub allowed_servers: Vec<String>,
    pub debounce_window: Duration,
}

impl ReplySettings {
    pub fn from_config(persona: &PersonaConfig, runtime: &RuntimeSettings) -> Self {
        Self {
            always_reply: persona.always_reply,
            use_reply_format: persona.use_reply_format,
            reply_delay: persona.reply_delay,
            typing_delay: persona.typing_delay,
            allowed_dms: persona.allowed_dms.clone(),
            allowed_servers: persona.allowed_servers.clone(),
            debounce_window: runtime.debounce_window(),
        }
    }
}

/// Why a message was dropped before reaching memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    SelfAuthored,
    DmNotAllowed,
    ServerNotAllowed,
}

/// What happened to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingOutcome {
    /// Dropped without being recorded.
    Ignored(IgnoreReason),
    /// Recorded in short-term memory; the persona was not addressed.
    NotAddressed,
    /// Recorded; the persona chose not to answer.
    Declined,
    /// Recorded and buffered for a reply.
    Buffered { new_buffer: bool },
}

struct ChannelBuffer {
    messages: Vec<IncomingMessage>,
    flush_timer: JoinHandle<()>,
}

pub struct DebounceEngine<P: ChatPlatform, R: MemoryRepository + 'static> {
    platform: Arc<P>,
    orchestrator: Arc<ConversationOrchestrator<R>>,
    short_term: ShortTermMemory,
    settings: ReplySettings,
    buffers: DashMap<String, ChannelBuffer>,
}

impl<P: ChatPlatform, R: MemoryRepository + 'static> DebounceEngine<P, R> {
    pub fn new(
        platform: Arc<P>,
        orchestrator: Arc<ConversationOrchestrator<R>>,
        short_term: ShortTermMemory,
        settings: ReplySettings,
    ) -> Self {
        Self {
            platform,
            orchestrator,
            short_term,
            settings,
            buffers: DashMap::new(),
        }
    }

    /// Whether a channel currently holds unflushed messages.
    pub fn has_buffer(&self, channel_id: &str) -> bool {
        self.buffers.contains_key(channel_id)
    }

    /// Handle one platform message.
    ///
    /// `force` bypasses the allow-lists and every addressing and willingness
    /// check; self-authored messages are still ignored.
    #[tracing::instrument(
        name = "on_incoming",
        skip(self, message),
        fields(
            persona = %self.orchestrator.persona(),
            channel_id = %message.channel.id,
            message_id = %message.id,
        )
    )]
    pub async fn on_incoming(self: &Arc<Self>, message: IncomingMessage, force: bool) -> IncomingOutcome {
        if let Some(reason) = self.ineligible(&message, force) {
            tracing::trace!(?reason, "Ignoring message");
            return IncomingOutcome::Ignored(reason);
        }

        let channel_id = message.channel.id.clone();
        self.short_term.record(&channel_id, message.to_chat_message());

        if !force {
            if !self.is_addressed(&message).await {
                return IncomingOutcome::NotAddressed;
            }

            if !self.settings.always_reply {
                let history = self.short_term.recent(&channel_id);
                let wants = self
                    .orchestrator
                    .decide_should_reply(&message.author.username, &message.content, &history)
                    .await;
                if !wants {
                    tracing::debug!("Persona declined to reply");
                    return IncomingOutcome::Declined;
                }
            }
        }

        let new_buffer = self.buffer(message);
        IncomingOutcome::Buffered { new_buffer }
    }

    fn ineligible(&self, message: &IncomingMessage, force: bool) -> Option<IgnoreReason> {
        if message.author.id == self.platform.self_user().id {
            return Some(IgnoreReason::SelfAuthored);
        }
        if force {
            return None;
        }

        if message.channel.kind.is_direct() {
            let allowed = &self.settings.allowed_dms;
            if !allowed.is_empty() && !allowed.contains(&message.author.id) {
                return Some(IgnoreReason::DmNotAllowed);
            }
        } else if let Some(guild_id) = &message.channel.guild_id {
            let allowed = &self.settings.allowed_servers;
            if !allowed.is_empty() && !allowed.contains(guild_id) {
                return Some(IgnoreReason::ServerNotAllowed);
            }
        }
        None
    }

    /// Direct message, explicit mention, or a reply to one of our messages.
    async fn is_addressed(&self, message: &IncomingMessage) -> bool {
        let self_id = &self.platform.self_user().id;
        if message.channel.kind.is_direct() || message.mentions.contains(self_id) {
            return true;
        }

        let Some(reference_id) = &message.reference_message_id else {
            return false;
        };
        match self.platform.fetch_message(&message.channel.id, reference_id).await {
            Ok(referenced) => referenced.author.id == *self_id,
            Err(e) => {
                tracing::debug!(error = %e, "Could not fetch referenced message");
                false
            }
        }
    }

    /// Park the message in its channel buffer. Returns `true` when a new
    /// buffer was created.
    fn buffer(self: &Arc<Self>, message: IncomingMessage) -> bool {
        let channel_id = message.channel.id.clone();
        match self.buffers.entry(channel_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let buffer = occupied.get_mut();
                buffer.flush_timer.abort();
                buffer.messages.push(message);
                buffer.flush_timer = self.schedule_flush(channel_id);
                tracing::debug!(buffered = buffer.messages.len(), "Debounce window reset");
                false
            }
            Entry::Vacant(vacant) => {
                let flush_timer = self.schedule_flush(channel_id.clone());
                vacant.insert(ChannelBuffer {
                    messages: vec![message],
                    flush_timer,
                });
                self.schedule_typing(channel_id);
                true
            }
        }
    }

    fn schedule_flush(self: &Arc<Self>, channel_id: String) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let window = self.settings.debounce_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Aborting the timer must never cancel a flush already under way.
            tokio::spawn(async move { engine.flush(&channel_id).await });
        })
    }

    fn schedule_typing(&self, channel_id: String) {
        let platform = Arc::clone(&self.platform);
        let delay = sample_delay(&self.settings.typing_delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = platform.send_typing(&channel_id).await {
                tracing::trace!(error = %e, "Typing indicator failed");
            }
        });
    }

    /// Turn a channel's buffer into one reply pass.
    ///
    /// A missing buffer (already flushed) is a no-op.
    pub async fn flush(&self, channel_id: &str) {
        let Some((_, buffer)) = self.buffers.remove(channel_id) else {
            return;
        };
        let Some(last) = buffer.messages.last() else {
            return;
        };

        tracing::info!(
            persona = %self.orchestrator.persona(),
            channel_id,
            count = buffer.messages.len(),
            "Replying to buffered messages"
        );

        let history = self.short_term.recent(channel_id);
        let response = self
            .orchestrator
            .generate_response(
                &last.speaker_display_name(),
                &last.author.username,
                &last.author.id,
                &history,
                &last.channel.location_label(),
            )
            .await;
        if response.is_empty() {
            return;
        }

        self.send_parts(last, &split_reply(&response)).await;

        let me = self.platform.self_user();
        self.short_term.record(
            channel_id,
            ChatMessage::model(
                channel_id,
                me.id.clone(),
                me.username.clone(),
                response.replace(SPLIT_TOKEN, " "),
                format!("generated-{}", Uuid::now_v7()),
            ),
        );
    }

    async fn send_parts(&self, target: &IncomingMessage, parts: &[String]) {
        let channel_id = &target.channel.id;

        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(sample_delay(&self.settings.reply_delay)).await;
            }

            if i == 0 && self.settings.use_reply_format {
                match self.platform.reply_to(channel_id, &target.id, part).await {
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Reply failed; falling back to plain send");
                    }
                }
            }

            if let Err(e) = self.platform.send_message(channel_id, part).await {
                tracing::warn!(error = %e, channel_id = %channel_id, "Failed to send reply part");
            }
        }
    }
}

/// Split a reply on [`SPLIT_TOKEN`], trimming parts and dropping empty ones.
pub fn split_reply(response: &str) -> Vec<String> {
    response
        .split(SPLIT_TOKEN)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// A uniformly random duration within the range (its minimum when inverted).
pub fn sample_delay(range: &DelayRange) -> Duration {
    if range.max_ms <= range.min_ms {
        return Duration::from_millis(range.min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(range.min_ms..=range.max_ms))
}
