//! Configuration types for Chorus.
//!
//! `AppConfig` is the top-level `chorus.toml`: database location, backend
//! settings, engine tunables, and one `PersonaConfig` per persona. Everything
//! except the persona list has sensible defaults. The file is loaded once at
//! startup and treated as immutable afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for a Chorus process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path of the SQLite memory database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub personas: Vec<PersonaConfig>,
}

fn default_database_path() -> String {
    "data/memory.db".to_string()
}

impl AppConfig {
    /// Check every constraint the loader cannot express through serde.
    ///
    /// Expects persona base prompts to be resolved already (see
    /// `CharacterConfig::base_prompt_file`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.personas.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[personas]] entry is required".to_string(),
            ));
        }

        self.runtime.validate()?;

        let mut seen = std::collections::HashSet::new();
        for persona in &self.personas {
            persona.validate()?;
            if !seen.insert(persona.character.name.to_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate persona name '{}'",
                    persona.character.name
                )));
            }
        }

        Ok(())
    }
}

/// Generative backend settings shared by all personas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Every environment variable whose name starts with this prefix holds
    /// one API key. Keys are used in variable-name order.
    #[serde(default = "default_api_key_env_prefix")]
    pub api_key_env_prefix: String,

    /// Override the backend base URL (proxies, tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env_prefix() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env_prefix: default_api_key_env_prefix(),
            base_url: None,
        }
    }
}

/// Engine tunables. Defaults match the documented behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Per-channel short-term history cap.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Quiet window before a channel buffer is flushed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_extraction_interval_minutes")]
    pub extraction_interval_minutes: u64,

    /// How far back each extraction run looks.
    #[serde(default = "default_extraction_window_minutes")]
    pub extraction_window_minutes: u64,

    /// Phase offset of the user-memory job relative to the gossip job.
    #[serde(default = "default_user_memory_offset_minutes")]
    pub user_memory_offset_minutes: u64,

    /// A target channel younger than this is considered active.
    #[serde(default = "default_proactive_quiet_minutes")]
    pub proactive_quiet_minutes: u64,

    /// How often watched channels are polled for new messages.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_history_limit() -> usize {
    50
}

fn default_debounce_ms() -> u64 {
    2500
}

fn default_extraction_interval_minutes() -> u64 {
    10
}

fn default_extraction_window_minutes() -> u64 {
    10
}

fn default_user_memory_offset_minutes() -> u64 {
    5
}

fn default_proactive_quiet_minutes() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    3000
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            debounce_ms: default_debounce_ms(),
            extraction_interval_minutes: default_extraction_interval_minutes(),
            extraction_window_minutes: default_extraction_window_minutes(),
            user_memory_offset_minutes: default_user_memory_offset_minutes(),
            proactive_quiet_minutes: default_proactive_quiet_minutes(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RuntimeSettings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn extraction_interval(&self) -> Duration {
        minutes(self.extraction_interval_minutes)
    }

    pub fn user_memory_offset(&self) -> Duration {
        minutes(self.user_memory_offset_minutes)
    }

    pub fn proactive_quiet_threshold(&self) -> Duration {
        minutes(self.proactive_quiet_minutes)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "runtime.history_limit must be greater than 0".to_string(),
            ));
        }
        if self.extraction_interval_minutes == 0 || self.extraction_window_minutes == 0 {
            return Err(ConfigError::Invalid(
                "runtime extraction interval and window must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "runtime.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Static configuration for one persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Name of the environment variable holding the platform token.
    pub token_env: String,

    pub character: CharacterConfig,

    /// Skip the willingness check for addressed messages.
    #[serde(default = "default_true")]
    pub always_reply: bool,

    /// Send the first part of a reply as a platform reply to the message.
    #[serde(default)]
    pub use_reply_format: bool,

    /// Pause between consecutive reply parts.
    #[serde(default = "default_reply_delay")]
    pub reply_delay: DelayRange,

    /// Delay before the typing indicator is shown.
    #[serde(default = "default_typing_delay")]
    pub typing_delay: DelayRange,

    /// When non-empty, only these user ids may DM the persona.
    #[serde(default)]
    pub allowed_dms: Vec<String>,

    /// When non-empty, only these server ids are served.
    #[serde(default)]
    pub allowed_servers: Vec<String>,

    /// Channels whose new messages are fed to the persona.
    #[serde(default)]
    pub watch_channels: Vec<String>,

    #[serde(default)]
    pub autonomy: AutonomyConfig,
}

fn default_true() -> bool {
    true
}

fn default_reply_delay() -> DelayRange {
    DelayRange::new(1000, 2000)
}

fn default_typing_delay() -> DelayRange {
    DelayRange::new(500, 3000)
}

impl PersonaConfig {
    pub fn name(&self) -> &str {
        &self.character.name
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name = self.character.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid(
                "persona character.name must not be empty".to_string(),
            ));
        }
        let invalid = |msg: &str| ConfigError::Invalid(format!("persona '{name}': {msg}"));

        if self.token_env.trim().is_empty() {
            return Err(invalid("token_env must not be empty"));
        }
        if self.character.base_prompt.trim().is_empty() {
            return Err(invalid("base prompt must not be empty"));
        }
        if !self.reply_delay.is_valid() {
            return Err(invalid("reply_delay.min_ms must not exceed max_ms"));
        }
        if !self.typing_delay.is_valid() {
            return Err(invalid("typing_delay.min_ms must not exceed max_ms"));
        }
        self.autonomy.validate().map_err(|msg| invalid(&msg))
    }
}

/// Persona identity and base instructions. Prompt content is opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub name: String,

    #[serde(default)]
    pub base_prompt: String,

    /// Read the base prompt from this file (relative to the config file)
    /// when `base_prompt` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_prompt_file: Option<String>,
}

/// Inclusive millisecond range for randomized human-like delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }
}

/// Bot-initiated messaging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub target_channels: Vec<String>,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Probability that a timer firing proceeds to a proactive check.
    #[serde(default = "default_chance")]
    pub chance: f64,
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_chance() -> f64 {
    0.1
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_channels: Vec::new(),
            interval_minutes: default_interval_minutes(),
            chance: default_chance(),
        }
    }
}

impl AutonomyConfig {
    pub fn interval(&self) -> Duration {
        minutes(self.interval_minutes)
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.chance) {
            return Err(format!("autonomy.chance must be within 0..=1, got {}", self.chance));
        }
        if self.interval_minutes == 0 {
            return Err("autonomy.interval_minutes must be greater than 0".to_string());
        }
        if self.enabled && self.target_channels.is_empty() {
            return Err("autonomy is enabled but target_channels is empty".to_string());
        }
        Ok(())
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[personas]]
token_env = "DISCORD_TOKEN"

[personas.character]
name = "Luna"
base_prompt = "You are Luna."
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.database_path, "data/memory.db");
        assert_eq!(config.backend.model, "gemini-2.5-flash");
        assert_eq!(config.backend.api_key_env_prefix, "GEMINI_API_KEY");
        assert_eq!(config.runtime, RuntimeSettings::default());

        let persona = &config.personas[0];
        assert!(persona.always_reply);
        assert!(!persona.use_reply_format);
        assert_eq!(persona.reply_delay, DelayRange::new(1000, 2000));
        assert_eq!(persona.typing_delay, DelayRange::new(500, 3000));
        assert!(!persona.autonomy.enabled);
        assert!((persona.autonomy.chance - 0.1).abs() < f64::EPSILON);
        config.validate().unwrap();
    }

    #[test]
    fn test_runtime_durations() {
        let settings = RuntimeSettings::default();
        assert_eq!(settings.debounce_window(), Duration::from_millis(2500));
        assert_eq!(settings.extraction_interval(), Duration::from_secs(600));
        assert_eq!(settings.user_memory_offset(), Duration::from_secs(300));
        assert_eq!(settings.proactive_quiet_threshold(), Duration::from_secs(300));
        assert_eq!(settings.poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_full_persona_config() {
        let toml_str = r#"
database_path = "/var/lib/chorus/memory.db"

[runtime]
debounce_ms = 1000

[[personas]]
token_env = "LUNA_TOKEN"
always_reply = false
use_reply_format = true
reply_delay = { min_ms = 1000, max_ms = 3000 }
typing_delay = { min_ms = 500, max_ms = 2000 }
allowed_dms = ["111"]
allowed_servers = ["222"]
watch_channels = ["444", "555"]

[personas.character]
name = "Luna"
base_prompt = "You are Luna."

[personas.autonomy]
enabled = true
target_channels = ["333"]
interval_minutes = 30
chance = 0.25
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.runtime.debounce_ms, 1000);
        assert_eq!(config.runtime.history_limit, 50);

        let persona = &config.personas[0];
        assert_eq!(persona.name(), "Luna");
        assert!(!persona.always_reply);
        assert!(persona.use_reply_format);
        assert_eq!(persona.allowed_dms, vec!["111"]);
        assert_eq!(persona.watch_channels, vec!["444", "555"]);
        assert_eq!(persona.autonomy.interval(), Duration::from_secs(1800));
    }

    #[test]
    fn test_validate_rejects_empty_persona_list() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.runtime.poll_interval_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_inverted_delay() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.personas[0].reply_delay = DelayRange::new(3000, 1000);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("reply_delay"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_out_of_range_chance() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.personas[0].autonomy.chance = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_autonomy_without_targets() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.personas[0].autonomy.enabled = true;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("target_channels"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        let mut twin = config.personas[0].clone();
        twin.character.name = "luna".to_string();
        config.personas.push(twin);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_empty_prompt() {
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.personas[0].character.base_prompt = "   ".to_string();
        assert!(config.validate().is_err());
    }
}
