//! Channel poller: turns the REST message history of watched channels into a
//! stream of [`IncomingMessage`] for `PersonaRuntime::run_events`.
//!
//! Each channel starts from its newest message at startup, so history that
//! predates the process is never replayed. A failed poll is logged and the
//! cursor is left where it was; the next tick retries from the same point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use chorus_types::platform::{ChannelInfo, IncomingMessage};

use super::client::DiscordRestPlatform;

/// Buffered messages between the poller and the persona.
const EVENT_BUFFER: usize = 256;

/// Cursor used for a channel that had no messages at startup.
const EMPTY_CURSOR: &str = "0";

struct WatchedChannel {
    info: ChannelInfo,
    cursor: Option<String>,
}

/// Spawn a poller over `channel_ids`.
///
/// The returned receiver closes when `cancel` fires or when none of the
/// channels could be resolved.
pub fn spawn_channel_poller(
    platform: Arc<DiscordRestPlatform>,
    channel_ids: Vec<String>,
    every: Duration,
    cancel: CancellationToken,
) -> (mpsc::Receiver<IncomingMessage>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let handle = tokio::spawn(async move {
        let mut watched = Vec::with_capacity(channel_ids.len());
        for channel_id in &channel_ids {
            match platform.channel_cursor(channel_id).await {
                Ok((info, cursor)) => watched.push(WatchedChannel { info, cursor }),
                Err(e) => {
                    tracing::warn!(channel_id = %channel_id, error = %e, "Cannot watch channel")
                }
            }
        }
        if watched.is_empty() {
            tracing::warn!("No watchable channels; poller exiting");
            return;
        }
        tracing::info!(channels = watched.len(), every_ms = every.as_millis() as u64, "Polling channels");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for channel in &mut watched {
                let after = channel.cursor.as_deref().unwrap_or(EMPTY_CURSOR);
                let batch = match platform.messages_after(&channel.info, after).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::warn!(channel_id = %channel.info.id, error = %e, "Channel poll failed");
                        continue;
                    }
                };

                for message in newer_than(channel.cursor.as_deref(), batch) {
                    channel.cursor = Some(message.id.clone());
                    if tx.send(message).await.is_err() {
                        tracing::debug!("Event receiver dropped; poller exiting");
                        return;
                    }
                }
            }
        }
    });

    (rx, handle)
}

/// Keep the messages newer than `cursor`, oldest first.
///
/// Snowflakes are decimal strings without leading zeros, so comparing by
/// length and then lexically matches numeric order.
fn newer_than(cursor: Option<&str>, mut batch: Vec<IncomingMessage>) -> Vec<IncomingMessage> {
    let key = |id: &str| (id.len(), id.to_string());
    if let Some(cursor) = cursor {
        let floor = key(cursor);
        batch.retain(|m| key(&m.id) > floor);
    }
    batch.sort_by_key(|m| key(&m.id));
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_types::platform::{ChannelKind, PlatformUser};

    fn message(id: &str) -> IncomingMessage {
        IncomingMessage {
            id: id.to_string(),
            channel: ChannelInfo {
                id: "c1".to_string(),
                kind: ChannelKind::Server,
                name: Some("general".to_string()),
                guild_id: Some("g1".to_string()),
                guild_name: None,
                last_message_at: None,
            },
            author: PlatformUser::new("u1", "mint"),
            content: format!("message {id}"),
            mentions: Vec::new(),
            reference_message_id: None,
            timestamp: None,
        }
    }

    fn ids(messages: &[IncomingMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_newer_than_orders_oldest_first() {
        // The history endpoint serves newest first.
        let batch = vec![message("1003"), message("999"), message("1001")];
        assert_eq!(ids(&newer_than(None, batch)), vec!["999", "1001", "1003"]);
    }

    #[test]
    fn test_newer_than_drops_seen_messages() {
        let batch = vec![message("1003"), message("1002"), message("1001"), message("998")];
        let fresh = newer_than(Some("1001"), batch);
        assert_eq!(ids(&fresh), vec!["1002", "1003"]);
    }

    #[test]
    fn test_newer_than_compares_numerically() {
        // "10000" sorts before "9999" lexically but is newer.
        let batch = vec![message("10000"), message("9998")];
        assert_eq!(ids(&newer_than(Some("9999"), batch)), vec!["10000"]);
    }
}
