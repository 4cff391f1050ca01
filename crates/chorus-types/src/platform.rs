//! Messaging platform event types.
//!
//! These model what the core needs to know about an inbound platform message:
//! author identity, channel context, mentions, and reply reference. Platform
//! adapters (e.g. the Discord REST adapter in chorus-infra) map their wire
//! payloads into these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::ChatMessage;

/// A user account on the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: String,
    pub username: String,
    /// Server nickname, when the message came from a server channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl PlatformUser {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
        }
    }
}

/// Kind of conversation a channel represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// One-to-one direct message.
    Dm,
    /// Multi-person direct message group.
    GroupDm,
    /// A channel inside a server (guild).
    Server,
}

impl ChannelKind {
    /// Direct and group direct messages both count as private conversation.
    pub fn is_direct(&self) -> bool {
        matches!(self, ChannelKind::Dm | ChannelKind::GroupDm)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Dm => write!(f, "dm"),
            ChannelKind::GroupDm => write!(f, "group_dm"),
            ChannelKind::Server => write!(f, "server"),
        }
    }
}

/// A channel as seen by the persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub kind: ChannelKind,
    /// Channel or group name, when the platform provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_name: Option<String>,
    /// Send time of the newest message the platform knows about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChannelInfo {
    /// Human-readable location label used in the reply prompt.
    ///
    /// `DMs` for direct messages, the group name (or `Group Chat`) for group
    /// DMs, and the server name for server channels.
    pub fn location_label(&self) -> String {
        match self.kind {
            ChannelKind::Dm => "DMs".to_string(),
            ChannelKind::GroupDm => self
                .name
                .clone()
                .unwrap_or_else(|| "Group Chat".to_string()),
            ChannelKind::Server => self
                .guild_name
                .clone()
                .unwrap_or_else(|| "Server".to_string()),
        }
    }
}

/// A message delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub channel: ChannelInfo,
    pub author: PlatformUser,
    pub content: String,
    /// Ids of users explicitly mentioned in the message.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// Id of the message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl IncomingMessage {
    /// Name used when talking to the author: the server nickname in server
    /// channels, the plain username everywhere else.
    pub fn speaker_display_name(&self) -> String {
        if self.channel.kind.is_direct() {
            return self.author.username.clone();
        }
        self.author
            .display_name
            .clone()
            .unwrap_or_else(|| self.author.username.clone())
    }

    /// Convert into the short-term memory representation.
    pub fn to_chat_message(&self) -> ChatMessage {
        let msg = ChatMessage::user(
            self.channel.id.clone(),
            self.author.id.clone(),
            self.author.username.clone(),
            self.content.clone(),
            self.id.clone(),
        );
        match self.timestamp {
            Some(ts) => msg.at(ts),
            None => msg,
        }
    }
}
