//! DiscordRestPlatform -- [`ChatPlatform`] over the Discord v10 REST API.
//!
//! The token is sent verbatim in the `Authorization` header, so bot accounts
//! configure it with the `Bot ` prefix. It is wrapped in [`SecretString`]
//! and never logged.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use chorus_core::platform::ChatPlatform;
use chorus_types::error::PlatformError;
use chorus_types::platform::{ChannelInfo, IncomingMessage, PlatformUser};

use super::types::{
    CreateMessage, CreateReference, CreatedMessage, DiscordChannel, DiscordGuild, DiscordMessage,
    DiscordUser,
};

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Largest page the message history endpoint serves.
pub const POLL_PAGE_LIMIT: usize = 50;

/// One logged-in Discord account.
pub struct DiscordRestPlatform {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
    user: PlatformUser,
    guild_names: Mutex<HashMap<String, String>>,
}

impl DiscordRestPlatform {
    /// Log in: validate the token by resolving the current user.
    pub async fn connect(token: SecretString, base_url: Option<&str>) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        let base_url = base_url
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let mut platform = Self {
            client,
            token,
            base_url,
            user: PlatformUser::new("", ""),
            guild_names: Mutex::new(HashMap::new()),
        };
        let me: DiscordUser = platform.get("/users/@me").await?;
        tracing::info!(user_id = %me.id, username = %me.username, "Logged in to Discord");
        platform.user = me.into();

        Ok(platform)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", self.token.expose_secret())
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, PlatformError> {
        let response = self
            .client
            .post(self.url(path))
            .header("Authorization", self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        decode(response).await
    }

    async fn guild_name(&self, guild_id: &str) -> Option<String> {
        let cached = self
            .guild_names
            .lock()
            .expect("guild name cache lock poisoned")
            .get(guild_id)
            .cloned();
        if cached.is_some() {
            return cached;
        }

        match self.get::<DiscordGuild>(&format!("/guilds/{guild_id}")).await {
            Ok(guild) => {
                self.guild_names
                    .lock()
                    .expect("guild name cache lock poisoned")
                    .insert(guild.id, guild.name.clone());
                Some(guild.name)
            }
            Err(e) => {
                tracing::debug!(guild_id, error = %e, "Could not resolve guild name");
                None
            }
        }
    }

    /// Resolve a channel together with the id of its newest message, the
    /// starting cursor for [`messages_after`](Self::messages_after).
    pub async fn channel_cursor(
        &self,
        channel_id: &str,
    ) -> Result<(ChannelInfo, Option<String>), PlatformError> {
        let channel: DiscordChannel = self.get(&format!("/channels/{channel_id}")).await?;
        let cursor = channel.last_message_id.clone();
        let guild_name = match channel.guild_id.as_deref() {
            Some(guild_id) => self.guild_name(guild_id).await,
            None => None,
        };
        Ok((channel.into_info(guild_name), cursor))
    }

    /// Up to [`POLL_PAGE_LIMIT`] messages posted after `after`, in whatever
    /// order the API returns them.
    pub async fn messages_after(
        &self,
        channel: &ChannelInfo,
        after: &str,
    ) -> Result<Vec<IncomingMessage>, PlatformError> {
        let messages: Vec<DiscordMessage> = self
            .get(&format!(
                "/channels/{}/messages?after={after}&limit={POLL_PAGE_LIMIT}",
                channel.id
            ))
            .await?;
        Ok(messages
            .into_iter()
            .map(|m| m.into_incoming(channel.clone()))
            .collect())
    }

    async fn create_message(
        &self,
        channel_id: &str,
        body: &CreateMessage<'_>,
    ) -> Result<String, PlatformError> {
        let created: CreatedMessage = self
            .post(&format!("/channels/{channel_id}/messages"), body)
            .await?;
        Ok(created.id)
    }
}

/// Map a response to its decoded body or a [`PlatformError`].
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PlatformError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_status(status.as_u16(), body));
    }
    response
        .json()
        .await
        .map_err(|e| PlatformError::Decode(e.to_string()))
}

pub fn map_status(status: u16, body: String) -> PlatformError {
    match status {
        401 => PlatformError::Unauthorized,
        404 => PlatformError::NotFound(body),
        _ => PlatformError::Status { status, body },
    }
}

impl ChatPlatform for DiscordRestPlatform {
    fn self_user(&self) -> &PlatformUser {
        &self.user
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String, PlatformError> {
        self.create_message(
            channel_id,
            &CreateMessage {
                content,
                message_reference: None,
            },
        )
        .await
    }

    async fn reply_to(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        self.create_message(
            channel_id,
            &CreateMessage {
                content,
                message_reference: Some(CreateReference {
                    message_id,
                    fail_if_not_exists: true,
                }),
            },
        )
        .await
    }

    async fn send_typing(&self, channel_id: &str) -> Result<(), PlatformError> {
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/typing")))
            .header("Authorization", self.token.expose_secret())
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(map_status(status.as_u16(), body))
        }
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError> {
        let channel: DiscordChannel = self.get(&format!("/channels/{channel_id}")).await?;
        let guild_name = match channel.guild_id.as_deref() {
            Some(guild_id) => self.guild_name(guild_id).await,
            None => None,
        };
        Ok(channel.into_info(guild_name))
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<IncomingMessage, PlatformError> {
        let channel = self.fetch_channel(channel_id).await?;
        let mut message: DiscordMessage = self
            .get(&format!("/channels/{channel_id}/messages/{message_id}"))
            .await?;

        // REST message payloads omit the member object; look up the nickname.
        let missing_member = message.member.is_none();
        if let (true, Some(guild_id)) = (missing_member, channel.guild_id.as_deref()) {
            message.member = self
                .get(&format!("/guilds/{guild_id}/members/{}", message.author.id))
                .await
                .ok();
        }

        Ok(message.into_incoming(channel))
    }
}
