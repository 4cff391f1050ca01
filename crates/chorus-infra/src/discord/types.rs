//! Discord API payloads and their mapping into platform types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use chorus_types::platform::{ChannelInfo, ChannelKind, IncomingMessage, PlatformUser};

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01).
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Channel type codes for direct conversations.
const CHANNEL_TYPE_DM: u8 = 1;
const CHANNEL_TYPE_GROUP_DM: u8 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl From<DiscordUser> for PlatformUser {
    fn from(user: DiscordUser) -> Self {
        PlatformUser::new(user.id, user.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordChannel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub last_message_id: Option<String>,
}

impl DiscordChannel {
    pub fn channel_kind(&self) -> ChannelKind {
        match self.kind {
            CHANNEL_TYPE_DM => ChannelKind::Dm,
            CHANNEL_TYPE_GROUP_DM => ChannelKind::GroupDm,
            _ => ChannelKind::Server,
        }
    }

    /// Map into [`ChannelInfo`]; the guild name is resolved separately.
    pub fn into_info(self, guild_name: Option<String>) -> ChannelInfo {
        let kind = self.channel_kind();
        ChannelInfo {
            last_message_at: self.last_message_id.as_deref().and_then(snowflake_time),
            id: self.id,
            kind,
            name: self.name,
            guild_id: self.guild_id,
            guild_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordGuild {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMember {
    #[serde(default)]
    pub nick: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReference {
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub member: Option<DiscordMember>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DiscordMessage {
    /// Map into [`IncomingMessage`] within an already-resolved channel.
    ///
    /// The server nickname becomes the author's display name.
    pub fn into_incoming(self, channel: ChannelInfo) -> IncomingMessage {
        let mut author = PlatformUser::from(self.author);
        author.display_name = self.member.and_then(|m| m.nick);

        IncomingMessage {
            id: self.id,
            channel,
            author,
            content: self.content,
            mentions: self.mentions.into_iter().map(|u| u.id).collect(),
            reference_message_id: self.message_reference.and_then(|r| r.message_id),
            timestamp: self.timestamp,
        }
    }
}

/// Body for `POST /channels/{id}/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessage<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<CreateReference<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateReference<'a> {
    pub message_id: &'a str,
    /// Fall back to a plain message when the referenced one is gone.
    pub fail_if_not_exists: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedMessage {
    pub id: String,
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_time(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let ms = (raw >> 22) + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(i64::try_from(ms).ok()?).single()
}
