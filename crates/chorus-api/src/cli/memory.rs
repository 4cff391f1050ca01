//! Memory inspection CLI commands: gossip, user, relationships, facts, add-fact.
//!
//! Read-mostly views over the shared memory store, scoped to one persona.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use chorus_core::memory::store::MemoryRepository;
use chorus_types::memory::GOSSIP_MARKER;

use super::MemoryCommand;
use crate::state::AppState;

pub async fn dispatch(state: &AppState, action: MemoryCommand, json: bool) -> Result<()> {
    match action {
        MemoryCommand::Gossip { persona } => gossip(state, &persona, json).await,
        MemoryCommand::User { persona, user_id } => user(state, &persona, &user_id, json).await,
        MemoryCommand::Relationships { persona, user_id } => {
            relationships(state, &persona, &user_id, json).await
        }
        MemoryCommand::Facts { persona } => facts(state, &persona, json).await,
        MemoryCommand::AddFact {
            persona,
            topic,
            content,
        } => add_fact(state, &persona, &topic, &content, json).await,
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::White))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_empty(what: &str, persona: &str) {
    println!();
    println!(
        "  {} No {what} for '{}'.",
        style("i").blue().bold(),
        style(persona).cyan(),
    );
    println!();
}

fn print_table(title: &str, persona: &str, table: &Table, count: usize) {
    println!();
    println!("  {title} for '{}'", style(persona).cyan().bold());
    println!();
    println!("{table}");
    println!();
    println!("  {} entr{}", style(count).bold(), if count == 1 { "y" } else { "ies" });
    println!();
}

async fn gossip(state: &AppState, persona: &str, json: bool) -> Result<()> {
    let character_id = state.character_id(persona)?;
    let entries = state.memory_repo.get_global(&character_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        print_empty("global memory", &character_id);
        return Ok(());
    }

    let mut table = new_table(&["Content", "Kind", "Recorded"]);
    for entry in &entries {
        let (content, kind) = if entry.is_gossip() {
            let text = entry.content.replacen(GOSSIP_MARKER, "", 1);
            (text.trim().to_string(), Cell::new("gossip").fg(Color::Magenta))
        } else {
            (entry.content.clone(), Cell::new("lore").fg(Color::Cyan))
        };
        table.add_row(vec![
            Cell::new(content).fg(Color::White),
            kind,
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    print_table("Global memory", &character_id, &table, entries.len());
    Ok(())
}

async fn user(state: &AppState, persona: &str, user_id: &str, json: bool) -> Result<()> {
    let character_id = state.character_id(persona)?;
    let entries = state
        .memory_repo
        .get_user_memory(&character_id, user_id)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        print_empty(&format!("memories of user {user_id}"), &character_id);
        return Ok(());
    }

    let mut table = new_table(&["Key", "Value", "Recorded"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(&entry.key).fg(Color::Yellow),
            Cell::new(&entry.value).fg(Color::White),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    print_table(&format!("User {user_id}"), &character_id, &table, entries.len());
    Ok(())
}

async fn relationships(state: &AppState, persona: &str, user_id: &str, json: bool) -> Result<()> {
    let character_id = state.character_id(persona)?;
    let entries = state
        .memory_repo
        .get_relationships(&character_id, user_id)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        print_empty(&format!("relationships involving {user_id}"), &character_id);
        return Ok(());
    }

    let mut table = new_table(&["From", "Type", "To", "Description"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(&entry.user_id_1).fg(Color::White),
            Cell::new(&entry.relationship_type).fg(Color::Magenta),
            Cell::new(&entry.user_id_2).fg(Color::White),
            Cell::new(&entry.description).fg(Color::DarkGrey),
        ]);
    }

    print_table("Relationships", &character_id, &table, entries.len());
    Ok(())
}

async fn facts(state: &AppState, persona: &str, json: bool) -> Result<()> {
    let character_id = state.character_id(persona)?;
    let entries = state.memory_repo.get_facts(&character_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        print_empty("curated facts", &character_id);
        return Ok(());
    }

    let mut table = new_table(&["Topic", "Content"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(&entry.topic).fg(Color::Yellow),
            Cell::new(&entry.content).fg(Color::White),
        ]);
    }

    print_table("Facts", &character_id, &table, entries.len());
    Ok(())
}

async fn add_fact(state: &AppState, persona: &str, topic: &str, content: &str, json: bool) -> Result<()> {
    let character_id = state.character_id(persona)?;
    state
        .memory_repo
        .upsert_fact(&character_id, topic, content)
        .await?;

    if json {
        let out = serde_json::json!({
            "persona": character_id,
            "topic": topic,
            "content": content,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "  {} Saved fact '{}' for '{}'",
            style("✓").green(),
            style(topic).yellow(),
            style(&character_id).cyan()
        );
    }
    Ok(())
}
