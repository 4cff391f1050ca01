//! Per-channel recent-message ring buffers.
//!
//! `ShortTermMemory` keeps the last N messages of every channel a persona has
//! seen, for the lifetime of the process. Nothing here is persisted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use chorus_types::message::ChatMessage;

/// Default per-channel history cap.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default)]
struct Channels {
    histories: HashMap<String, VecDeque<ChatMessage>>,
    /// Channel ids in the order their history was first created.
    order: Vec<String>,
}

/// Bounded recent history for every channel.
///
/// Each channel's history is created lazily on its first message and evicts
/// its oldest entry once it grows past the cap. Cloning produces a shared
/// view (backed by `Arc<Mutex<...>>`).
#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    channels: Arc<Mutex<Channels>>,
    max_per_channel: usize,
}

impl ShortTermMemory {
    pub fn new(max_per_channel: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(Channels::default())),
            max_per_channel: max_per_channel.max(1),
        }
    }

    /// Append a message to its channel, stamping it with the current time if
    /// it carries no timestamp.
    pub fn record(&self, channel_id: &str, mut message: ChatMessage) {
        if message.timestamp.is_none() {
            message.timestamp = Some(Utc::now());
        }

        let mut channels = self.channels.lock().expect("short-term memory lock poisoned");
        let Channels { histories, order } = &mut *channels;
        let history = histories.entry(channel_id.to_string()).or_insert_with(|| {
            order.push(channel_id.to_string());
            VecDeque::with_capacity(self.max_per_channel + 1)
        });

        history.push_back(message);
        while history.len() > self.max_per_channel {
            history.pop_front();
        }
    }

    /// The channel's history in insertion order (empty for unknown channels).
    pub fn recent(&self, channel_id: &str) -> Vec<ChatMessage> {
        let channels = self.channels.lock().expect("short-term memory lock poisoned");
        channels
            .histories
            .get(channel_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The last `limit` messages of all channels concatenated in channel
    /// creation order.
    ///
    /// Channels are appended one after another, not interleaved by time, so
    /// the result favors the most recently created channels. Every message
    /// keeps its `channel_id`.
    pub fn recent_across_channels(&self, limit: usize) -> Vec<ChatMessage> {
        let channels = self.channels.lock().expect("short-term memory lock poisoned");
        let flattened: Vec<&ChatMessage> = channels
            .order
            .iter()
            .filter_map(|id| channels.histories.get(id))
            .flat_map(|history| history.iter())
            .collect();

        let skip = flattened.len().saturating_sub(limit);
        flattened.into_iter().skip(skip).cloned().collect()
    }

    /// Every message newer than `window` ago across all channels, oldest first.
    pub fn since(&self, window: Duration) -> Vec<ChatMessage> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.since_cutoff(cutoff)
    }

    /// Every message stamped strictly after `cutoff`, oldest first.
    pub fn since_cutoff(&self, cutoff: DateTime<Utc>) -> Vec<ChatMessage> {
        let channels = self.channels.lock().expect("short-term memory lock poisoned");
        let mut messages: Vec<ChatMessage> = channels
            .histories
            .values()
            .flat_map(|history| history.iter())
            .filter(|message| message.sent_at() > cutoff)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.sent_at());
        messages
    }

    /// Timestamp of the newest message remembered for a channel.
    pub fn last_activity(&self, channel_id: &str) -> Option<DateTime<Utc>> {
        let channels = self.channels.lock().expect("short-term memory lock poisoned");
        channels
            .histories
            .get(channel_id)
            .and_then(|history| history.back())
            .map(|message| message.sent_at())
    }
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
