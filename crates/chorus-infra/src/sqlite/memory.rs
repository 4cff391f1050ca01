//! SQLite memory repository implementation.
//!
//! Implements `MemoryRepository` from `chorus-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, writes on the single
//! writer connection, reads on the reader pool.

use chorus_core::memory::store::{FACTS_LIMIT, GLOBAL_MEMORY_LIMIT, MemoryRepository};
use chorus_types::error::RepositoryError;
use chorus_types::memory::{FactEntry, GlobalMemoryEntry, RelationshipEntry, UserMemoryEntry};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MemoryRepository`.
#[derive(Clone)]
pub struct SqliteMemoryRepository {
    pool: DatabasePool,
}

impl SqliteMemoryRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct GlobalMemoryRow {
    character_id: String,
    content: String,
    created_at: Option<String>,
}

impl GlobalMemoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            character_id: row.try_get("character_id")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<GlobalMemoryEntry, RepositoryError> {
        Ok(GlobalMemoryEntry {
            character_id: self.character_id,
            content: self.content,
            created_at: parse_timestamp(self.created_at.as_deref())?,
        })
    }
}

struct UserMemoryRow {
    character_id: String,
    user_id: String,
    key: String,
    value: String,
    created_at: Option<String>,
}

impl UserMemoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            character_id: row.try_get("character_id")?,
            user_id: row.try_get("user_id")?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<UserMemoryEntry, RepositoryError> {
        Ok(UserMemoryEntry {
            character_id: self.character_id,
            user_id: self.user_id,
            key: self.key,
            value: self.value,
            created_at: parse_timestamp(self.created_at.as_deref())?,
        })
    }
}

fn fact_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FactEntry, sqlx::Error> {
    Ok(FactEntry {
        character_id: row.try_get("character_id")?,
        topic: row.try_get("topic")?,
        content: row.try_get("content")?,
    })
}

fn relationship_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RelationshipEntry, sqlx::Error> {
    let description: Option<String> = row.try_get("description")?;
    Ok(RelationshipEntry {
        character_id: row.try_get("character_id")?,
        user_id_1: row.try_get("user_id_1")?,
        user_id_2: row.try_get("user_id_2")?,
        relationship_type: row.try_get("relationship_type")?,
        description: description.unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a `created_at` column.
///
/// SQLite's `CURRENT_TIMESTAMP` yields `YYYY-MM-DD HH:MM:SS` in UTC; rows
/// written by other tools may carry RFC 3339 instead. A missing value maps
/// to the Unix epoch.
fn parse_timestamp(value: Option<&str>) -> Result<DateTime<Utc>, RepositoryError> {
    let Some(s) = value else {
        return Ok(DateTime::UNIX_EPOCH);
    };
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// MemoryRepository implementation
// ---------------------------------------------------------------------------

impl MemoryRepository for SqliteMemoryRepository {
    async fn add_global(&self, character_id: &str, content: &str) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO global_memory (character_id, content) VALUES (?, ?)")
            .bind(character_id)
            .bind(content)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(())
    }

    async fn get_global(&self, character_id: &str) -> Result<Vec<GlobalMemoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT character_id, content, created_at FROM global_memory
               WHERE character_id = ?
               ORDER BY created_at DESC, id DESC
               LIMIT ?"#,
        )
        .bind(character_id)
        .bind(GLOBAL_MEMORY_LIMIT)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                GlobalMemoryRow::from_row(row)
                    .map_err(query_error)?
                    .into_entry()
            })
            .collect()
    }

    async fn set_user_memory(
        &self,
        character_id: &str,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT OR REPLACE INTO user_memory (character_id, user_id, key, value) VALUES (?, ?, ?, ?)",
        )
        .bind(character_id)
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_user_memory(
        &self,
        character_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserMemoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT character_id, user_id, key, value, created_at FROM user_memory
               WHERE character_id = ? AND user_id = ?
               ORDER BY id ASC"#,
        )
        .bind(character_id)
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| UserMemoryRow::from_row(row).map_err(query_error)?.into_entry())
            .collect()
    }

    async fn upsert_fact(
        &self,
        character_id: &str,
        topic: &str,
        content: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR REPLACE INTO facts (character_id, topic, content) VALUES (?, ?, ?)")
            .bind(character_id)
            .bind(topic)
            .bind(content)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(())
    }

    async fn get_facts(&self, character_id: &str) -> Result<Vec<FactEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT character_id, topic, content FROM facts WHERE character_id = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(character_id)
        .bind(FACTS_LIMIT)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| fact_from_row(row).map_err(query_error))
            .collect()
    }

    async fn add_relationship(&self, relationship: &RelationshipEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO relationships (character_id, user_id_1, user_id_2, relationship_type, description)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&relationship.character_id)
        .bind(&relationship.user_id_1)
        .bind(&relationship.user_id_2)
        .bind(&relationship.relationship_type)
        .bind(&relationship.description)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_relationships(
        &self,
        character_id: &str,
        user_id: &str,
    ) -> Result<Vec<RelationshipEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT character_id, user_id_1, user_id_2, relationship_type, description FROM relationships
               WHERE character_id = ? AND (user_id_1 = ? OR user_id_2 = ?)
               ORDER BY id ASC"#,
        )
        .bind(character_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| relationship_from_row(row).map_err(query_error))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::database_url;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let url = database_url(&dir.path().join("test.db"));
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn relationship(a: &str, b: &str, kind: &str, description: &str) -> RelationshipEntry {
        RelationshipEntry {
            character_id: "Luna".to_string(),
            user_id_1: a.to_string(),
            user_id_2: b.to_string(),
            relationship_type: kind.to_string(),
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_global_ignores_duplicates() {
        let repo = SqliteMemoryRepository::new(test_pool().await);

        repo.add_global("Luna", "[GOSSIP] mint got a cat").await.unwrap();
        repo.add_global("Luna", "[GOSSIP] mint got a cat").await.unwrap();
        repo.add_global("Luna", "[GOSSIP] rue moved to Oslo").await.unwrap();

        let entries = repo.get_global("Luna").await.unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first
        assert_eq!(entries[0].content, "[GOSSIP] rue moved to Oslo");
        assert!(entries.iter().all(|e| e.is_gossip()));
    }

    #[tokio::test]
    async fn test_get_global_is_bounded() {
        let repo = SqliteMemoryRepository::new(test_pool().await);
        for i in 0..60 {
            repo.add_global("Luna", &format!("line {i}")).await.unwrap();
        }

        let entries = repo.get_global("Luna").await.unwrap();
        assert_eq!(entries.len(), GLOBAL_MEMORY_LIMIT as usize);
        assert_eq!(entries[0].content, "line 59");
    }

    #[tokio::test]
    async fn test_global_memory_is_namespaced() {
        let repo = SqliteMemoryRepository::new(test_pool().await);

        repo.add_global("Luna", "shared line").await.unwrap();
        repo.add_global("Sol", "shared line").await.unwrap();
        repo.add_global("Sol", "sol only").await.unwrap();

        assert_eq!(repo.get_global("Luna").await.unwrap().len(), 1);
        assert_eq!(repo.get_global("Sol").await.unwrap().len(), 2);
        assert!(repo.get_global("Nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_memory_overwrites_key() {
        let repo = SqliteMemoryRepository::new(test_pool().await);

        repo.set_user_memory("Luna", "u1", "pet", "dog").await.unwrap();
        repo.set_user_memory("Luna", "u1", "pet", "cat").await.unwrap();
        repo.set_user_memory("Luna", "u1", "city", "Lyon").await.unwrap();
        repo.set_user_memory("Sol", "u1", "pet", "parrot").await.unwrap();

        let entries = repo.get_user_memory("Luna", "u1").await.unwrap();
        assert_eq!(entries.len(), 2);
        let pet = entries.iter().find(|e| e.key == "pet").unwrap();
        assert_eq!(pet.value, "cat");

        let sol = repo.get_user_memory("Sol", "u1").await.unwrap();
        assert_eq!(sol.len(), 1);
        assert_eq!(sol[0].value, "parrot");
    }

    #[tokio::test]
    async fn test_facts_upsert_and_limit() {
        let repo = SqliteMemoryRepository::new(test_pool().await);

        repo.upsert_fact("Luna", "rules", "be kind").await.unwrap();
        repo.upsert_fact("Luna", "rules", "be kind, no spoilers").await.unwrap();

        let facts = repo.get_facts("Luna").await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "be kind, no spoilers");

        for i in 0..30 {
            repo.upsert_fact("Luna", &format!("topic {i}"), "x").await.unwrap();
        }
        assert_eq!(repo.get_facts("Luna").await.unwrap().len(), FACTS_LIMIT as usize);
    }

    #[tokio::test]
    async fn test_relationships_match_either_side() {
        let repo = SqliteMemoryRepository::new(test_pool().await);

        repo.add_relationship(&relationship("u1", "u2", "friend", "met at the cafe"))
            .await
            .unwrap();
        repo.add_relationship(&relationship("u3", "u1", "rival", "chess"))
            .await
            .unwrap();
        repo.add_relationship(&relationship("u2", "u3", "sibling", ""))
            .await
            .unwrap();

        let for_u1 = repo.get_relationships("Luna", "u1").await.unwrap();
        assert_eq!(for_u1.len(), 2);

        let for_u2 = repo.get_relationships("Luna", "u2").await.unwrap();
        assert_eq!(for_u2.len(), 2);
        assert!(repo.get_relationships("Sol", "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relationship_replaces_description() {
        let repo = SqliteMemoryRepository::new(test_pool().await);

        repo.add_relationship(&relationship("u1", "u2", "friend", "old"))
            .await
            .unwrap();
        repo.add_relationship(&relationship("u1", "u2", "friend", "best friends now"))
            .await
            .unwrap();

        let rels = repo.get_relationships("Luna", "u2").await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].description, "best friends now");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let sqlite = parse_timestamp(Some("2024-05-01 12:30:00")).unwrap();
        assert_eq!(sqlite.to_rfc3339(), "2024-05-01T12:30:00+00:00");

        let rfc = parse_timestamp(Some("2024-05-01T12:30:00+02:00")).unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-05-01T10:30:00+00:00");

        assert_eq!(parse_timestamp(None).unwrap(), DateTime::UNIX_EPOCH);
        assert!(parse_timestamp(Some("yesterday")).is_err());
    }
}
