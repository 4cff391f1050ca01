//! Persistent memory types for Chorus.
//!
//! These rows model what a persona remembers across restarts: shareable
//! gossip and lore, per-user attributes, curated facts, and relationships.
//! Every row is namespaced by `character_id` (the persona name) so personas
//! sharing one database never see each other's private memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a global memory entry as shareable gossip.
pub const GOSSIP_MARKER: &str = "[GOSSIP]";

/// Namespace used for rows written before persona namespacing existed.
pub const DEFAULT_CHARACTER_ID: &str = "default";

/// An append-only fact or gossip line. Unique per `(character_id, content)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMemoryEntry {
    pub character_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl GlobalMemoryEntry {
    /// Whether this entry was recorded as shareable gossip.
    pub fn is_gossip(&self) -> bool {
        self.content.contains(GOSSIP_MARKER)
    }
}

/// A mutable per-user attribute. Unique per `(character_id, user_id, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMemoryEntry {
    pub character_id: String,
    pub user_id: String,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// A curated fact. Unique per `(character_id, topic)`.
///
/// Not written by the extraction jobs; populated by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactEntry {
    pub character_id: String,
    pub topic: String,
    pub content: String,
}

/// A typed link between two identities.
///
/// Unique per `(character_id, user_id_1, user_id_2, relationship_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEntry {
    pub character_id: String,
    pub user_id_1: String,
    pub user_id_2: String,
    pub relationship_type: String,
    pub description: String,
}

/// Format a gossip line for storage in global memory.
pub fn gossip_entry(fact: &str) -> String {
    format!("{GOSSIP_MARKER} {fact}")
}

/// Synthetic identity used when a relationship involves the persona itself.
pub fn persona_identity(character_name: &str) -> String {
    format!("bot_{character_name}")
}
