//! `chorus check`: validate configuration and report credential availability.
//!
//! Secret values are never printed; only whether they are present.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;

use chorus_infra::config::{load_api_keys, load_config, persona_token};
use chorus_types::config::{AppConfig, PersonaConfig};

#[derive(Debug, Serialize)]
struct PersonaReport {
    name: String,
    token_env: String,
    token_present: bool,
    always_reply: bool,
    autonomy_enabled: bool,
    autonomy_targets: usize,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    config: String,
    database_path: String,
    model: String,
    api_keys: usize,
    personas: Vec<PersonaReport>,
}

impl CheckReport {
    fn healthy(&self) -> bool {
        self.api_keys > 0 && self.personas.iter().any(|p| p.token_present)
    }
}

fn persona_report(persona: &PersonaConfig, token_present: bool) -> PersonaReport {
    PersonaReport {
        name: persona.name().to_string(),
        token_env: persona.token_env.clone(),
        token_present,
        always_reply: persona.always_reply,
        autonomy_enabled: persona.autonomy.enabled,
        autonomy_targets: persona.autonomy.target_channels.len(),
    }
}

fn build_report(path: &Path, config: &AppConfig) -> CheckReport {
    CheckReport {
        config: path.display().to_string(),
        database_path: config.database_path.clone(),
        model: config.backend.model.clone(),
        api_keys: load_api_keys(&config.backend.api_key_env_prefix).len(),
        personas: config
            .personas
            .iter()
            .map(|p| persona_report(p, persona_token(p).is_some()))
            .collect(),
    }
}

pub async fn check(path: &Path, json: bool) -> Result<()> {
    let config = load_config(path)
        .await
        .with_context(|| format!("Configuration check failed for {}", path.display()))?;
    let report = build_report(path, &config);

    if json {
        let mut value = serde_json::to_value(&report)?;
        value["healthy"] = serde_json::Value::Bool(report.healthy());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let check_mark = |ok: bool| {
        if ok {
            format!("{}", style("✓").green())
        } else {
            format!("{}", style("✗").red())
        }
    };

    println!();
    println!("  Configuration '{}'", style(&report.config).cyan());
    println!();
    println!("  {} configuration valid", check_mark(true));
    println!(
        "  {} {} API key{} for {} (prefix {})",
        check_mark(report.api_keys > 0),
        report.api_keys,
        if report.api_keys == 1 { "" } else { "s" },
        style(&report.model).bold(),
        config.backend.api_key_env_prefix
    );
    println!("    database: {}", report.database_path);
    println!();

    for persona in &report.personas {
        let autonomy = if persona.autonomy_enabled {
            format!("autonomy on ({} channels)", persona.autonomy_targets)
        } else {
            "autonomy off".to_string()
        };
        println!(
            "  {} {} {} {}",
            check_mark(persona.token_present),
            style(&persona.name).cyan().bold(),
            style(format!("[{}]", persona.token_env)).dim(),
            style(autonomy).dim()
        );
    }
    println!();

    Ok(())
}
