//! Time-driven persona behavior.
//!
//! `AutonomyScheduler` runs the periodic background jobs of one persona:
//! gossip extraction and user-memory extraction on a shared cadence with a
//! phase offset, plus the opt-in proactive messaging loop. All jobs run on
//! the same runtime as message handling and stop when their
//! `CancellationToken` is cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use chorus_types::config::{AutonomyConfig, PersonaConfig, RuntimeSettings};
use chorus_types::message::ChatMessage;

use crate::memory::short_term::ShortTermMemory;
use crate::memory::store::MemoryRepository;
use crate::platform::ChatPlatform;

use super::orchestrator::ConversationOrchestrator;

/// Timing of the background jobs.
#[derive(Debug, Clone)]
pub struct AutonomySettings {
    pub extraction_interval: Duration,
    /// How far back each extraction run looks.
    pub extraction_window: Duration,
    /// Delay of the user-memory job relative to the gossip job.
    pub user_memory_offset: Duration,
    /// A target channel with activity newer than this is left alone.
    pub quiet_threshold: Duration,
    pub autonomy: AutonomyConfig,
}

impl AutonomySettings {
    pub fn from_config(persona: &PersonaConfig, runtime: &RuntimeSettings) -> Self {
        Self {
            extraction_interval: runtime.extraction_interval(),
            extraction_window: Duration::from_secs(runtime.extraction_window_minutes * 60),
            user_memory_offset: runtime.user_memory_offset(),
            quiet_threshold: runtime.proactive_quiet_threshold(),
            autonomy: persona.autonomy.clone(),
        }
    }
}

/// Result of one proactive timer firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProactiveOutcome {
    /// The random draw was not below the configured chance.
    Skipped,
    NoTargets,
    /// The target channel could not be fetched.
    ChannelUnavailable { channel_id: String },
    /// The target channel saw a message within the quiet threshold.
    ChannelActive { channel_id: String },
    /// The persona had nothing to say.
    Declined { channel_id: String },
    SendFailed { channel_id: String },
    Sent { channel_id: String },
}

pub struct AutonomyScheduler<P: ChatPlatform, R: MemoryRepository + 'static> {
    platform: Arc<P>,
    orchestrator: Arc<ConversationOrchestrator<R>>,
    short_term: ShortTermMemory,
    settings: AutonomySettings,
}

impl<P: ChatPlatform, R: MemoryRepository + 'static> AutonomyScheduler<P, R> {
    pub fn new(
        platform: Arc<P>,
        orchestrator: Arc<ConversationOrchestrator<R>>,
        short_term: ShortTermMemory,
        settings: AutonomySettings,
    ) -> Self {
        Self {
            platform,
            orchestrator,
            short_term,
            settings,
        }
    }

    /// Spawn every background job. Each stops once `cancel` fires.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let persona = self.orchestrator.persona().to_string();
        let interval = self.settings.extraction_interval;
        let mut handles = Vec::with_capacity(3);

        let this = Arc::clone(self);
        handles.push(spawn_periodic(interval, interval, cancel.clone(), move || {
            let this = Arc::clone(&this);
            async move {
                this.run_gossip_extraction().await;
            }
        }));

        let this = Arc::clone(self);
        let first = self.settings.user_memory_offset + interval;
        handles.push(spawn_periodic(first, interval, cancel.clone(), move || {
            let this = Arc::clone(&this);
            async move {
                this.run_user_memory_extraction().await;
            }
        }));

        let autonomy = &self.settings.autonomy;
        if autonomy.enabled {
            tracing::info!(
                persona = %persona,
                interval_minutes = autonomy.interval_minutes,
                chance = autonomy.chance,
                "Autonomy enabled"
            );
            let period = autonomy.interval();
            let this = Arc::clone(self);
            handles.push(spawn_periodic(period, period, cancel, move || {
                let this = Arc::clone(&this);
                async move {
                    let outcome = this.proactive_tick().await;
                    tracing::debug!(?outcome, "Proactive tick");
                }
            }));
        }

        tracing::info!(persona = %persona, "Background tasks started");
        handles
    }

    /// Extract gossip from the recent window. Returns lines stored.
    pub async fn run_gossip_extraction(&self) -> usize {
        let messages = self.short_term.since(self.settings.extraction_window);
        if messages.is_empty() {
            return 0;
        }
        tracing::debug!(
            persona = %self.orchestrator.persona(),
            count = messages.len(),
            "Processing gossip"
        );
        self.orchestrator.extract_gossip(&messages).await
    }

    /// Extract user facts and relationships from the recent window.
    pub async fn run_user_memory_extraction(&self) -> usize {
        let messages = self.short_term.since(self.settings.extraction_window);
        if messages.is_empty() {
            return 0;
        }
        tracing::debug!(
            persona = %self.orchestrator.persona(),
            count = messages.len(),
            "Processing user memories"
        );
        self.orchestrator.extract_user_memories(&messages).await
    }

    /// One firing of the proactive timer.
    pub async fn proactive_tick(&self) -> ProactiveOutcome {
        let (roll, target) = {
            let mut rng = rand::thread_rng();
            let roll: f64 = rng.gen_range(0.0..1.0);
            let target = self.settings.autonomy.target_channels.choose(&mut rng).cloned();
            (roll, target)
        };

        if roll >= self.settings.autonomy.chance {
            return ProactiveOutcome::Skipped;
        }
        let Some(channel_id) = target else {
            return ProactiveOutcome::NoTargets;
        };

        let channel = match self.platform.fetch_channel(&channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::debug!(error = %e, channel_id = %channel_id, "Proactive target unavailable");
                return ProactiveOutcome::ChannelUnavailable { channel_id };
            }
        };

        let last_activity = self
            .short_term
            .last_activity(&channel_id)
            .max(channel.last_message_at);
        if let Some(last) = last_activity {
            let quiet_for = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
            if quiet_for < self.settings.quiet_threshold {
                return ProactiveOutcome::ChannelActive { channel_id };
            }
        }

        tracing::info!(
            persona = %self.orchestrator.persona(),
            channel_id = %channel_id,
            "Proactive check passed"
        );

        let time_label = Local::now().format("%H:%M").to_string();
        let Some(text) = self.orchestrator.generate_proactive_message(&time_label).await else {
            return ProactiveOutcome::Declined { channel_id };
        };

        if let Err(e) = self.platform.send_message(&channel_id, &text).await {
            tracing::warn!(error = %e, channel_id = %channel_id, "Failed to send proactive message");
            return ProactiveOutcome::SendFailed { channel_id };
        }

        let me = self.platform.self_user();
        self.short_term.record(
            &channel_id,
            ChatMessage::model(
                channel_id.clone(),
                me.id.clone(),
                me.username.clone(),
                text,
                format!("proactive-{}", Uuid::now_v7()),
            ),
        );
        ProactiveOutcome::Sent { channel_id }
    }
}

/// Run `job` at `start + first`, then every `period`, until cancelled.
fn spawn_periodic<F, Fut>(
    first: Duration,
    period: Duration,
    cancel: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => job().await,
            }
        }
    })
}
