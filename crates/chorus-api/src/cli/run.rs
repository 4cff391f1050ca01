//! `chorus run`: log in every persona, start background jobs and channel
//! pollers, and serve the operator console until shutdown.

use std::sync::Arc;

use anyhow::{Result, bail};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use chorus_core::persona::debounce::IncomingOutcome;
use chorus_core::persona::runtime::PersonaRuntime;
use chorus_infra::config::{load_api_keys, persona_token};
use chorus_infra::discord::{DiscordRestPlatform, spawn_channel_poller};
use chorus_infra::llm::create_rotator;
use chorus_infra::sqlite::memory::SqliteMemoryRepository;

use super::operator::{OperatorCommand, TRIGGER_USAGE, parse_command, select_personas};
use crate::state::AppState;

type Persona = PersonaRuntime<DiscordRestPlatform, SqliteMemoryRepository>;

enum ConsoleExit {
    Quit,
    InputClosed,
}

pub async fn run(state: &AppState, shutdown: impl Future<Output = ()>) -> Result<()> {
    let personas = start_personas(state).await?;
    if personas.is_empty() {
        bail!("No personas could be started");
    }

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for persona in &personas {
        handles.extend(persona.start_background(cancel.clone()));
        handles.extend(start_event_source(state, persona, &cancel));
    }

    println!();
    println!(
        "  {} {} persona{} online. Type {} for commands.",
        style("⚡").bold(),
        style(personas.len()).bold(),
        if personas.len() == 1 { "" } else { "s" },
        style("help").cyan()
    );
    println!();

    tokio::pin!(shutdown);
    tokio::select! {
        _ = &mut shutdown => {}
        exit = operator_console(&personas) => {
            if let ConsoleExit::InputClosed = exit {
                tracing::debug!("Console input closed; waiting for shutdown signal");
                shutdown.await;
            }
        }
    }

    tracing::info!("Shutting down");
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    println!("\n  Stopped.");
    Ok(())
}

/// Log in each configured persona, skipping those that cannot start.
async fn start_personas(state: &AppState) -> Result<Vec<Persona>> {
    let prefix = &state.config.backend.api_key_env_prefix;
    let mut personas = Vec::new();

    for config in &state.config.personas {
        let name = config.name();
        let Some(token) = persona_token(config) else {
            tracing::warn!(persona = %name, token_env = %config.token_env, "Token not set; skipping persona");
            continue;
        };

        let platform = match DiscordRestPlatform::connect(token, None).await {
            Ok(platform) => Arc::new(platform),
            Err(e) => {
                tracing::error!(persona = %name, error = %e, "Login failed; skipping persona");
                continue;
            }
        };

        let keys = load_api_keys(prefix);
        tracing::info!(persona = %name, keys = keys.len(), "Loaded API keys");
        let rotator = create_rotator(&state.config.backend, keys)?;

        personas.push(PersonaRuntime::new(
            config,
            &state.config.runtime,
            platform,
            Arc::clone(&state.memory_repo),
            rotator,
        ));
        tracing::info!(persona = %name, "Persona started");
    }

    Ok(personas)
}

/// Poll the persona's watched channels and feed new messages to it.
fn start_event_source(
    state: &AppState,
    persona: &Persona,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let watch = state
        .config
        .personas
        .iter()
        .find(|c| c.name() == persona.name())
        .map(|c| c.watch_channels.clone())
        .unwrap_or_default();
    if watch.is_empty() {
        tracing::info!(persona = %persona.name(), "No watched channels; replies only via trigger");
        return Vec::new();
    }

    let (events, poller) = spawn_channel_poller(
        Arc::clone(persona.platform()),
        watch,
        state.config.runtime.poll_interval(),
        cancel.clone(),
    );
    vec![poller, persona.run_events(events, cancel.clone())]
}

async fn operator_console(personas: &[Persona]) -> ConsoleExit {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ConsoleExit::InputClosed,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read console input");
                return ConsoleExit::InputClosed;
            }
        };

        match parse_command(&line) {
            OperatorCommand::Trigger {
                channel_id,
                message_id,
                filter,
            } => trigger(personas, &channel_id, &message_id, filter.as_deref()).await,
            OperatorCommand::Usage => println!("{TRIGGER_USAGE}"),
            OperatorCommand::Help => {
                println!("{TRIGGER_USAGE}");
                println!("quit");
            }
            OperatorCommand::Quit => return ConsoleExit::Quit,
            OperatorCommand::Empty => {}
            OperatorCommand::Unknown(verb) => {
                println!("Unknown command '{verb}'. {TRIGGER_USAGE}");
            }
        }
    }
}

async fn trigger(personas: &[Persona], channel_id: &str, message_id: &str, filter: Option<&str>) {
    let selected = select_personas(personas.iter().map(|p| p.name()), filter);
    if selected.is_empty() {
        println!("No matching personas found.");
        return;
    }

    for index in selected {
        let persona = &personas[index];
        match persona.trigger(channel_id, message_id).await {
            Ok(outcome) => println!(
                "  {} {}: {}",
                style("✓").green(),
                style(persona.name()).cyan(),
                describe_outcome(outcome)
            ),
            Err(e) => println!(
                "  {} {}: {e}",
                style("✗").red(),
                style(persona.name()).cyan()
            ),
        }
    }
}

fn describe_outcome(outcome: IncomingOutcome) -> &'static str {
    match outcome {
        IncomingOutcome::Buffered { .. } => "reply queued",
        IncomingOutcome::Ignored(_) => "ignored (own message)",
        IncomingOutcome::NotAddressed => "not addressed",
        IncomingOutcome::Declined => "declined",
    }
}
