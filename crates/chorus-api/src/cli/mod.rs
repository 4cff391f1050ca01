//! CLI command definitions and dispatch for the `chorus` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod check;
pub mod memory;
pub mod operator;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run AI personas that chat like people.
#[derive(Parser)]
#[command(name = "chorus", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, env = "CHORUS_CONFIG", default_value = "chorus.toml")]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in every configured persona and start replying.
    Run,

    /// Validate the configuration and report credential availability.
    Check,

    /// Inspect or seed a persona's long-term memory.
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Show global memory (gossip and lore), newest first.
    Gossip {
        /// Persona name.
        persona: String,
    },

    /// Show what a persona remembers about a user.
    User {
        persona: String,
        /// Platform user id.
        user_id: String,
    },

    /// Show relationships involving a user.
    Relationships {
        persona: String,
        /// Platform user id (or `bot_<name>` for the persona itself).
        user_id: String,
    },

    /// Show curated facts.
    Facts { persona: String },

    /// Insert or replace a curated fact.
    #[command(name = "add-fact")]
    AddFact {
        persona: String,
        topic: String,
        content: String,
    },
}
