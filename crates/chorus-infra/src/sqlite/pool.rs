//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. `DatabasePool` pairs a
//! multi-connection reader pool for concurrent reads with a single-connection
//! writer pool for serialized writes. One pool is shared by every persona in
//! the process; table uniqueness constraints, not locking, keep concurrent
//! writers consistent.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Tables that predate persona namespacing and may lack `character_id`.
const NAMESPACED_TABLES: [&str; 4] = ["global_memory", "user_memory", "facts", "relationships"];

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: Multi-connection pool (up to 8) for concurrent SELECT queries.
/// - `writer`: Single-connection pool for serialized INSERT/UPDATE/DELETE.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Create a new DatabasePool with split reader/writer connections.
    ///
    /// Runs migrations on the writer pool, then adds the namespacing column
    /// to tables created by older versions.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        // Run migrations on writer before opening reader pool
        sqlx::migrate!("../../migrations").run(&writer).await?;
        add_namespace_columns(&writer).await;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(read_opts)
            .await?;

        Ok(Self { reader, writer })
    }
}

/// Best-effort additive migration: add `character_id` to every memory table.
///
/// Fails harmlessly (and is logged at debug) when the column already exists.
async fn add_namespace_columns(writer: &SqlitePool) {
    for table in NAMESPACED_TABLES {
        let sql = format!(
            "ALTER TABLE {table} ADD COLUMN character_id TEXT NOT NULL DEFAULT 'default'"
        );
        match sqlx::query(&sql).execute(writer).await {
            Ok(_) => tracing::info!(table, "Added character_id column"),
            Err(e) => tracing::debug!(table, error = %e, "character_id column already present"),
        }
    }
}

/// Build a SQLite URL for a database file, creating it when missing.
pub fn database_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}
