use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use ai_client::{strip_code_blocks, OpenAi};
use opsgraph_common::Properties;

// ---------------------------------------------------------------------------
// TextExtractor
// ---------------------------------------------------------------------------

/// Opaque prompt-in, text-out extraction backend. Implementations may wrap
/// their JSON in prose; `parse_extraction` copes with that.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl TextExtractor for OpenAi {
    async fn extract(&self, prompt: &str) -> Result<String> {
        self.complete(EXTRACTION_SYSTEM_PROMPT, prompt).await
    }
}

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You extract deployment and incident facts into a fixed JSON graph schema. \
     Respond with JSON only.";

/// The fixed extraction prompt for one piece of source text.
pub fn build_extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract entities and relationships from the text below.

Entity types (use exactly these names):
- Service: identifier is the service name. Properties may include "platform".
- EnvVar: identifier is the environment variable key. Properties may include "description", "required".
- Incident: identifier is the incident id. Properties may include "cause", "impact", "severity".

Relationship types (use exactly these names):
- SERVICE_REQUIRES_ENVVAR: from a Service identifier to an EnvVar identifier.
- INCIDENT_IMPACTS_SERVICE: from an Incident identifier to a Service identifier.

Only emit relationships whose endpoints are also listed as entities.

Return a JSON object of this shape and nothing else:
{{
  "entities": [{{"type": "Service", "identifier": "...", "properties": {{}}}}],
  "relationships": [{{"type": "SERVICE_REQUIRES_ENVVAR", "from": "...", "to": "...", "properties": {{}}}}]
}}

Text:
{text}"#
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Outermost `{...}` span, for responses that wrap JSON in prose.
static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON block pattern is valid"));

/// A parsed extraction response. Items stay untyped here so one malformed
/// item is reported on its own instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entities: Vec<Value>,
    pub relationships: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_or_number")]
    pub identifier: String,
    #[serde(default, deserialize_with = "object_or_null")]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedRelationship {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_or_number")]
    pub from: String,
    #[serde(deserialize_with = "string_or_number")]
    pub to: String,
    #[serde(default, deserialize_with = "object_or_null")]
    pub properties: Properties,
}

/// Parse a raw extraction response. Errors describe why the response as a
/// whole is unusable.
pub fn parse_extraction(raw: &str) -> std::result::Result<Extraction, String> {
    let value = serde_json::from_str::<Value>(strip_code_blocks(raw)).or_else(|direct| {
        let block = JSON_BLOCK
            .find(raw)
            .ok_or_else(|| format!("response is not JSON and contains no JSON object: {direct}"))?;
        serde_json::from_str::<Value>(block.as_str())
            .map_err(|e| format!("embedded JSON object is invalid: {e}"))
    })?;

    let Value::Object(mut object) = value else {
        return Err("response is not a JSON object".to_string());
    };

    Ok(Extraction {
        entities: take_list(&mut object, "entities")?,
        relationships: take_list(&mut object, "relationships")?,
    })
}

/// The key must be present; `null` counts as an empty list.
fn take_list(
    object: &mut serde_json::Map<String, Value>,
    key: &str,
) -> std::result::Result<Vec<Value>, String> {
    match object.remove(key) {
        None => Err(format!("response is missing '{key}'")),
        Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(format!("'{key}' must be a list, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a non-empty identifier, got {}",
            json_kind(&other)
        ))),
    }
}

fn object_or_null<'de, D>(deserializer: D) -> std::result::Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Properties::new()),
        Value::Object(map) => Ok(map),
        other => Err(de::Error::custom(format!(
            "properties must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"entities":[{"type":"Service","identifier":"crm7"}],"relationships":[]}"#;
        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.entities.len(), 1);
        assert!(extraction.relationships.is_empty());
    }

    #[test]
    fn recovers_json_wrapped_in_prose() {
        let raw = "Sure! Here is the graph:\n{\"entities\": [], \"relationships\": []}\nLet me know.";
        assert_eq!(parse_extraction(raw).unwrap(), Extraction::default());
    }

    #[test]
    fn recovers_fenced_json() {
        let raw = "```json\n{\"entities\": null, \"relationships\": []}\n```";
        assert_eq!(parse_extraction(raw).unwrap(), Extraction::default());
    }

    #[test]
    fn rejects_text_without_json() {
        let err = parse_extraction("I could not find anything.").unwrap_err();
        assert!(err.contains("no JSON object"));
    }

    #[test]
    fn rejects_missing_keys() {
        let err = parse_extraction(r#"{"entities": []}"#).unwrap_err();
        assert!(err.contains("relationships"));
    }

    #[test]
    fn rejects_non_list_entities() {
        let err = parse_extraction(r#"{"entities": "crm7", "relationships": []}"#).unwrap_err();
        assert!(err.contains("must be a list"));
    }

    #[test]
    fn entity_accepts_numeric_identifier_and_null_properties() {
        let entity: ExtractedEntity = serde_json::from_value(json!({
            "type": "Incident",
            "identifier": 101,
            "properties": null
        }))
        .unwrap();
        assert_eq!(entity.identifier, "101");
        assert!(entity.properties.is_empty());
    }

    #[test]
    fn entity_rejects_blank_identifier() {
        let result: std::result::Result<ExtractedEntity, _> =
            serde_json::from_value(json!({"type": "Service", "identifier": "  "}));
        assert!(result.is_err());
    }

    #[test]
    fn prompt_embeds_text_and_vocabulary() {
        let prompt = build_extraction_prompt("crm7 on Vercel requires SUPABASE_URL");
        assert!(prompt.ends_with("crm7 on Vercel requires SUPABASE_URL"));
        assert!(prompt.contains("SERVICE_REQUIRES_ENVVAR"));
        assert!(prompt.contains("INCIDENT_IMPACTS_SERVICE"));
    }
}
