//! Chat message types held in short-term memory.
//!
//! A `ChatMessage` is what a persona remembers about a single line of
//! conversation: who said it, where, and when. Messages are produced when a
//! platform event arrives or when the persona sends a reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who authored a message from the persona's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Someone else in the conversation.
    User,
    /// The persona itself.
    Model,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Model => write!(f, "model"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "model" => Ok(MessageRole::Model),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single remembered line of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel_id: String,
    pub author_id: String,
    /// Username of the author (used when rendering history into prompts).
    pub author_name: String,
    pub content: String,
    pub role: MessageRole,
    /// Platform message id, or a synthetic id for persona-authored lines.
    pub id: String,
    /// Assigned by short-term memory on insert when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Build a message authored by someone other than the persona.
    pub fn user(
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        content: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            content: content.into(),
            role: MessageRole::User,
            id: id.into(),
            timestamp: None,
        }
    }

    /// Build a message authored by the persona itself.
    pub fn model(
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        content: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Model,
            ..Self::user(channel_id, author_id, author_name, content, id)
        }
    }

    /// Attach an explicit timestamp (e.g. the platform's own send time).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The message timestamp, or the Unix epoch for a message never stored.
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// `name: content`, the form used when rendering history into prompts.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.author_name, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::User, MessageRole::Model] {
            let parsed: MessageRole = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
        assert!("assistant".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_model_constructor_sets_role() {
        let msg = ChatMessage::model("c1", "bot", "Luna", "hey", "generated-1");
        assert_eq!(msg.role, MessageRole::Model);
        assert_eq!(msg.channel_id, "c1");
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_sent_at_defaults_to_epoch() {
        let msg = ChatMessage::user("c1", "u1", "mint", "hi", "m1");
        assert_eq!(msg.sent_at(), DateTime::<Utc>::UNIX_EPOCH);

        let now = Utc::now();
        assert_eq!(msg.at(now).sent_at(), now);
    }

    #[test]
    fn test_transcript_line() {
        let msg = ChatMessage::user("c1", "u1", "mint", "anyone up?", "m1");
        assert_eq!(msg.transcript_line(), "mint: anyone up?");
    }

    #[test]
    fn test_timestamp_skipped_when_absent() {
        let msg = ChatMessage::user("c1", "u1", "mint", "hi", "m1");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("timestamp"));
        assert!(json.contains("\"role\":\"user\""));
    }
}
