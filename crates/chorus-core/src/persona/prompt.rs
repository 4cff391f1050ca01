//! Prompt builders for the conversation orchestrator.
//!
//! Every builder is a pure function of its inputs so the exact text sent to
//! the backend can be asserted in tests. Persona instructions are opaque
//! configuration and are inserted verbatim.

use std::fmt::Write;

use chorus_types::memory::{FactEntry, GlobalMemoryEntry, RelationshipEntry, UserMemoryEntry};
use chorus_types::message::ChatMessage;

/// How many trailing history entries inform the should-reply decision.
pub const SHOULD_REPLY_CONTEXT: usize = 3;

/// Memory and context gathered for one reply.
#[derive(Debug, Default, Clone)]
pub struct ReplyContext<'a> {
    pub base_prompt: &'a str,
    pub location: &'a str,
    pub display_name: &'a str,
    pub username: &'a str,
    pub global_memory: &'a [GlobalMemoryEntry],
    pub user_memory: &'a [UserMemoryEntry],
    pub facts: &'a [FactEntry],
    pub relationships: &'a [RelationshipEntry],
    pub other_conversations: &'a [ChatMessage],
    pub history: &'a [ChatMessage],
}

pub fn should_reply(persona: &str, content: &str, history: &[ChatMessage]) -> String {
    let start = history.len().saturating_sub(SHOULD_REPLY_CONTEXT);
    let context = transcript(&history[start..]);

    format!(
        r#"You are {persona}. Someone said: "{content}"

Recent conversation context:
{context}

Based on your personality, do you want to reply to this message?
- Reply with ONLY "YES" if you want to engage
- Reply with ONLY "NO" if you want to ignore it

Consider:
- Is this message interesting or relevant to you?
- Are you mentioned, or is someone talking to you?
- Does it fit your vibe and personality?"#
    )
}

pub fn reply(ctx: &ReplyContext<'_>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", ctx.base_prompt.trim_end());

    prompt.push_str("\nMemories:\n");
    for entry in ctx.global_memory {
        let _ = writeln!(prompt, "> {}", entry.content);
    }
    for entry in ctx.user_memory {
        let _ = writeln!(prompt, "> {}: {}", entry.key, entry.value);
    }
    for fact in ctx.facts {
        let _ = writeln!(prompt, "> {}: {}", fact.topic, fact.content);
    }

    prompt.push_str("\nRelationships:\n");
    for rel in ctx.relationships {
        let _ = writeln!(
            prompt,
            "> {} - {} - {}: {}",
            rel.user_id_1, rel.relationship_type, rel.user_id_2, rel.description
        );
    }

    if !ctx.other_conversations.is_empty() {
        prompt.push_str("\nRecent context from other conversations:\n");
        for msg in ctx.other_conversations {
            let _ = writeln!(prompt, "> {}", msg.transcript_line());
        }
    }

    let _ = write!(
        prompt,
        "\nCURRENT CONTEXT:\n- Location: {}\n- Talking to: {} (username: {})\n",
        ctx.location, ctx.display_name, ctx.username
    );

    prompt.push_str("\nChat history:\n");
    prompt.push_str(&transcript(ctx.history));
    prompt
}

pub fn extract_gossip(persona: &str, conversations: &[ChatMessage]) -> String {
    let lines = extraction_lines(conversations);
    format!(
        r#"You are {persona}. You have been talking with different people.
Read these recent conversations and pick out INTERESTING FACTS or GOSSIP you might naturally bring up with others.

CONVERSATIONS:
{lines}

Look for:
1. Interesting updates about people
2. Things people told you that others might ask about
3. Drama, news, or notable events
4. Skip greetings, small talk and other boring lines

Return ONLY a JSON object of shareable one-line facts:
{{"gossip": ["Mint said someone was bothering her", "Kai is playing valorant today"]}}

If nothing is interesting, return: {{"gossip": []}}"#
    )
}

pub fn extract_user_memories(persona: &str, conversations: &[ChatMessage]) -> String {
    let lines = extraction_lines(conversations);
    format!(
        r#"You are {persona}. Read these conversations and extract USER-SPECIFIC information.
Each line is formatted as `name (user_id): message`.

CONVERSATIONS:
{lines}

Extract:
1. User facts: personal details about each user (age, preferences, real name, job, location, hobbies)
2. Relationships: connections between users, or between a user and {persona}
   (use "{persona}" as the id when the relationship involves you)

Return ONLY JSON, using the user_id values from the conversation:
{{
  "user_facts": [
    {{"user_id": "123", "key": "age", "value": "18"}}
  ],
  "relationships": [
    {{"user_id_1": "123", "user_id_2": "456", "type": "friend", "description": "close friends"}}
  ]
}}

If nothing is worth remembering: {{"user_facts": [], "relationships": []}}"#
    )
}

pub fn proactive(persona: &str, time_label: &str, gossip: &[String]) -> String {
    let mut known = String::new();
    for item in gossip {
        let _ = writeln!(known, "- {item}");
    }

    format!(
        r#"You are {persona}. It is currently {time_label}.
You are thinking about sending a message to a group chat out of the blue.

RECENT GOSSIP AND FACTS you know:
{known}
Decide whether you want to say something.
1. If you have interesting gossip, you might share it.
2. If it is morning or night, you might greet people.
3. If you are bored, you might start a conversation.

Return ONLY the message you want to send.
If you do not want to say anything right now (which is fine), return ONLY "NO"."#
    )
}

/// `name: content` lines joined by newlines.
fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(ChatMessage::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn extraction_lines(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{} ({}): {}", m.author_name, m.author_id, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
