//! MemoryRepository trait definition.
//!
//! Persistent, persona-namespaced memory: global lore and gossip, per-user
//! attributes, curated facts, and relationships. Every method takes the
//! persona's `character_id` so personas sharing one store stay isolated.

use chorus_types::error::RepositoryError;
use chorus_types::memory::{FactEntry, GlobalMemoryEntry, RelationshipEntry, UserMemoryEntry};

/// Maximum number of global entries returned by [`MemoryRepository::get_global`].
pub const GLOBAL_MEMORY_LIMIT: i64 = 50;

/// Maximum number of curated facts returned by [`MemoryRepository::get_facts`].
pub const FACTS_LIMIT: i64 = 20;

/// Repository trait for persona long-term memory persistence.
///
/// Implementations live in chorus-infra (e.g., `SqliteMemoryRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// Writes are idempotent: uniqueness constraints turn a repeated write into
/// a no-op (global memory) or an overwrite (user memory, facts,
/// relationships), never a duplicate row.
pub trait MemoryRepository: Send + Sync {
    /// Append a global memory line. Duplicate `(character_id, content)` pairs
    /// are silently ignored.
    fn add_global(
        &self,
        character_id: &str,
        content: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Most recent global entries, newest first, at most [`GLOBAL_MEMORY_LIMIT`].
    fn get_global(
        &self,
        character_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<GlobalMemoryEntry>, RepositoryError>> + Send;

    /// Insert or replace a per-user attribute.
    fn set_user_memory(
        &self,
        character_id: &str,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All attributes remembered about a user.
    fn get_user_memory(
        &self,
        character_id: &str,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<UserMemoryEntry>, RepositoryError>> + Send;

    /// Insert or replace a curated fact for a topic.
    fn upsert_fact(
        &self,
        character_id: &str,
        topic: &str,
        content: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Curated facts, at most [`FACTS_LIMIT`].
    fn get_facts(
        &self,
        character_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<FactEntry>, RepositoryError>> + Send;

    /// Insert or replace a relationship keyed by both identities and its type.
    fn add_relationship(
        &self,
        relationship: &RelationshipEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Relationships in which `user_id` appears on either side.
    fn get_relationships(
        &self,
        character_id: &str,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RelationshipEntry>, RepositoryError>> + Send;
}
