//! Operator console command parsing.
//!
//! The console reads one command per line from stdin while personas run:
//!
//! ```text
//! trigger <channelId> <messageId> [personaName]
//! ```

/// Usage line printed when `trigger` is missing arguments.
pub const TRIGGER_USAGE: &str = "Usage: trigger <channelId> <messageId> [personaName]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Force a reply to a historical message.
    Trigger {
        channel_id: String,
        message_id: String,
        filter: Option<String>,
    },
    /// `trigger` with missing arguments.
    Usage,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> OperatorCommand {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return OperatorCommand::Empty;
    };

    match verb.to_lowercase().as_str() {
        "trigger" => match (words.next(), words.next()) {
            (Some(channel_id), Some(message_id)) => {
                let rest: Vec<&str> = words.collect();
                OperatorCommand::Trigger {
                    channel_id: channel_id.to_string(),
                    message_id: message_id.to_string(),
                    filter: (!rest.is_empty()).then(|| rest.join(" ")),
                }
            }
            _ => OperatorCommand::Usage,
        },
        "help" | "?" => OperatorCommand::Help,
        "quit" | "exit" => OperatorCommand::Quit,
        other => OperatorCommand::Unknown(other.to_string()),
    }
}

/// Indices of persona names matching `filter` as a case-insensitive
/// substring. No filter selects every persona.
pub fn select_personas<'a>(
    names: impl IntoIterator<Item = &'a str>,
    filter: Option<&str>,
) -> Vec<usize> {
    let needle = filter.map(str::to_lowercase);
    names
        .into_iter()
        .enumerate()
        .filter(|(_, name)| match &needle {
            Some(needle) => name.to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .map(|(i, _)| i)
        .collect()
}
