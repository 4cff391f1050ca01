//! Application state wiring configuration and storage together.
//!
//! AppState holds what every command needs: the validated configuration and
//! the shared SQLite memory store. Per-persona wiring happens in `cli::run`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use chorus_infra::config::load_config;
use chorus_infra::sqlite::memory::SqliteMemoryRepository;
use chorus_infra::sqlite::pool::{DatabasePool, database_url};
use chorus_types::config::AppConfig;
use chorus_types::memory::DEFAULT_CHARACTER_ID;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub memory_repo: Arc<SqliteMemoryRepository>,
}

impl AppState {
    /// Load the configuration and open the memory database.
    pub async fn init(config_path: &Path) -> anyhow::Result<Self> {
        let config = load_config(config_path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

        let db_path = PathBuf::from(&config.database_path);
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let db_pool = DatabasePool::new(&database_url(&db_path))
            .await
            .with_context(|| format!("Failed to open memory database {}", db_path.display()))?;
        tracing::info!(path = %db_path.display(), "Memory database ready");

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            memory_repo: Arc::new(SqliteMemoryRepository::new(db_pool)),
        })
    }

    /// Resolve a persona name (case-insensitive) to its memory namespace.
    ///
    /// The legacy `default` namespace is always addressable.
    pub fn character_id(&self, persona: &str) -> anyhow::Result<String> {
        resolve_character_id(&self.config, persona)
    }
}

fn resolve_character_id(config: &AppConfig, persona: &str) -> anyhow::Result<String> {
    if let Some(found) = config
        .personas
        .iter()
        .find(|p| p.name().eq_ignore_ascii_case(persona))
    {
        return Ok(found.name().to_string());
    }
    if persona == DEFAULT_CHARACTER_ID {
        return Ok(DEFAULT_CHARACTER_ID.to_string());
    }
    anyhow::bail!("Persona '{persona}' is not configured")
}
