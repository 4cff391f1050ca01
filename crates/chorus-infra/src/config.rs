//! Configuration and credential loading for Chorus.
//!
//! Reads the TOML configuration file into [`AppConfig`], resolves persona
//! base prompts stored in separate files, and validates the result. Secrets
//! never live in the file: platform tokens and backend API keys come from the
//! environment and are wrapped in [`SecretString`].

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use chorus_types::config::{AppConfig, PersonaConfig};
use chorus_types::error::ConfigError;

/// Load, resolve and validate the configuration at `path`.
///
/// Unlike optional settings files, a missing or malformed configuration is
/// an error: there is nothing to run without personas.
pub async fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut config: AppConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for persona in &mut config.personas {
        resolve_base_prompt(persona, &base_dir).await?;
    }

    config.validate()?;
    tracing::debug!(
        path = %path.display(),
        personas = config.personas.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Fill `base_prompt` from `base_prompt_file` when the inline prompt is empty.
async fn resolve_base_prompt(persona: &mut PersonaConfig, base_dir: &Path) -> Result<(), ConfigError> {
    if !persona.character.base_prompt.trim().is_empty() {
        return Ok(());
    }
    let Some(file) = persona.character.base_prompt_file.as_deref() else {
        return Ok(());
    };

    let prompt_path: PathBuf = base_dir.join(file);
    persona.character.base_prompt = tokio::fs::read_to_string(&prompt_path)
        .await
        .map_err(|e| ConfigError::Io {
            path: prompt_path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(())
}

/// Collect backend API keys from environment-style pairs.
///
/// Every non-empty value whose name starts with `prefix` is kept, ordered by
/// variable name so `KEY_1`, `KEY_2`, ... rotate in a stable order.
pub fn collect_api_keys<I>(vars: I, prefix: &str) -> Vec<SecretString>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut matching: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(name, value)| name.starts_with(prefix) && !value.trim().is_empty())
        .collect();
    matching.sort_by(|a, b| a.0.cmp(&b.0));

    matching
        .into_iter()
        .map(|(_, value)| SecretString::from(value.trim().to_string()))
        .collect()
}

/// Backend API keys from the process environment.
pub fn load_api_keys(prefix: &str) -> Vec<SecretString> {
    collect_api_keys(std::env::vars(), prefix)
}

/// The platform token for a persona, if its environment variable is set.
pub fn persona_token(persona: &PersonaConfig) -> Option<SecretString> {
    std::env::var(&persona.token_env)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .map(|token| SecretString::from(token.trim().to_string()))
}
