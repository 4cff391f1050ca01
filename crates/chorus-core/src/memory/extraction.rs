//! Lenient parsing of extraction output.
//!
//! Extraction prompts ask the backend for a small JSON object. Models often
//! wrap it in code fences or return something else entirely, so parsing here
//! never fails: unparseable output is "nothing extracted", and malformed
//! entries are skipped one by one.

use serde::Deserialize;
use serde_json::{Map, Value};

/// A per-user attribute returned by user-memory extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUserFact {
    pub user_id: String,
    pub key: String,
    pub value: String,
}

/// A relationship returned by user-memory extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRelationship {
    pub user_id_1: String,
    pub user_id_2: String,
    pub relationship_type: String,
    pub description: String,
}

/// Everything user-memory extraction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMemoryExtraction {
    pub user_facts: Vec<ExtractedUserFact>,
    pub relationships: Vec<ExtractedRelationship>,
}

impl UserMemoryExtraction {
    pub fn is_empty(&self) -> bool {
        self.user_facts.is_empty() && self.relationships.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawUserFact {
    user_id: Value,
    key: Value,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    user_id_1: Value,
    user_id_2: Value,
    #[serde(rename = "type")]
    relationship_type: Value,
    #[serde(default)]
    description: Value,
}

/// Remove Markdown code-fence markers (```` ```json ```` and ```` ``` ````).
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse backend output into a JSON object.
///
/// Anything that is not a JSON object after fence stripping yields an empty
/// object.
pub fn parse_object(raw: &str) -> Map<String, Value> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(
                kind = json_kind(&other),
                "Extraction output is not a JSON object; treating as empty"
            );
            Map::new()
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                content_preview = preview(&cleaned),
                "Failed to parse extraction JSON; treating as empty"
            );
            Map::new()
        }
    }
}

/// The `gossip` list of a gossip-extraction response.
pub fn parse_gossip(raw: &str) -> Vec<String> {
    let object = parse_object(raw);
    list(&object, "gossip")
        .iter()
        .filter_map(scalar_text)
        .filter(|fact| !fact.trim().is_empty())
        .collect()
}

/// The `user_facts` and `relationships` lists of a user-memory response.
pub fn parse_user_memories(raw: &str) -> UserMemoryExtraction {
    let object = parse_object(raw);

    let user_facts = list(&object, "user_facts")
        .iter()
        .filter_map(|item| serde_json::from_value::<RawUserFact>(item.clone()).ok())
        .filter_map(|raw| {
            Some(ExtractedUserFact {
                user_id: non_empty(&raw.user_id)?,
                key: non_empty(&raw.key)?,
                value: scalar_text(&raw.value)?,
            })
        })
        .collect();

    let relationships = list(&object, "relationships")
        .iter()
        .filter_map(|item| serde_json::from_value::<RawRelationship>(item.clone()).ok())
        .filter_map(|raw| {
            Some(ExtractedRelationship {
                user_id_1: non_empty(&raw.user_id_1)?,
                user_id_2: non_empty(&raw.user_id_2)?,
                relationship_type: non_empty(&raw.relationship_type)?,
                description: scalar_text(&raw.description).unwrap_or_default(),
            })
        })
        .collect();

    UserMemoryExtraction {
        user_facts,
        relationships,
    }
}

fn list<'a>(object: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Strings pass through; numbers and booleans are stringified.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty(value: &Value) -> Option<String> {
    scalar_text(value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(s: &str) -> &str {
    let end = s
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}
