use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

/// A list field as the model or a heuristic produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawList {
    Joined(String),
    Items(Vec<String>),
}

/// Unvalidated metadata, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    pub title: Option<String>,
    pub title_en: Option<String>,
    pub authors: Option<RawList>,
    pub journal: Option<String>,
    pub year: Option<String>,
    pub doi: Option<String>,
    pub keywords: Option<RawList>,
    pub abstract_text: Option<String>,
    pub confidence: Option<f64>,
}

impl RawMetadata {
    /// Read the fields out of a model reply object. Field types are taken
    /// loosely: numbers where strings are expected and vice versa.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(EngineError::MalformedPayload(format!(
                "expected a JSON object, got {}",
                kind_of(value)
            )));
        };
        Ok(Self {
            title: string_field(map, &["title"]),
            title_en: string_field(map, &["title_en", "english_title"]),
            authors: list_field(map, &["authors", "author"]),
            journal: string_field(map, &["journal", "venue"]),
            year: string_field(map, &["year"]),
            doi: string_field(map, &["doi", "DOI"]),
            keywords: list_field(map, &["keywords"]),
            abstract_text: string_field(map, &["abstract"]),
            confidence: map.get("confidence").and_then(number_like),
        })
    }
}

/// Recover the JSON object from a model reply: the whole reply, else a fenced
/// code block, else the outermost brace span.
pub fn parse_model_reply(content: &str) -> Result<RawMetadata> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return RawMetadata::from_value(&value);
    }
    if let Some(block) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1))
        && let Ok(value) = serde_json::from_str::<Value>(block.as_str())
    {
        return RawMetadata::from_value(&value);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
    {
        return RawMetadata::from_value(&value);
    }
    Err(EngineError::MalformedPayload(format!(
        "no JSON object in reply: {}",
        preview(trimmed)
    )))
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn list_field(map: &Map<String, Value>, keys: &[&str]) -> Option<RawList> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(RawList::Joined(s.clone())),
        Value::Array(items) => {
            let items: Vec<String> = items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect();
            (!items.is_empty()).then_some(RawList::Items(items))
        }
        _ => None,
    })
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        out.push('…');
    }
    out
}
