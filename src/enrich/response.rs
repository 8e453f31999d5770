//! Extraction of the per-code JSON object from raw model text.
//!
//! Models are asked for bare JSON but regularly wrap it in markdown fences or
//! add a sentence of prose; both are tolerated here.
use super::StoredResult;
use crate::table::normalize_code;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Reply values keyed by normalized code.
pub type ParsedReply = BTreeMap<String, StoredResult>;

const FENCED_BLOCK: &str = r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```";

/// Parse a model reply into per-code results.
///
/// Fails when no JSON object can be recovered; the caller treats that as a
/// malformed reply.
pub fn parse_reply(text: &str) -> Result<ParsedReply> {
    let object = extract_object(text)?;
    Ok(object
        .iter()
        .map(|(code, value)| (normalize_code(code), StoredResult::from_reply_value(value)))
        .collect())
}

fn extract_object(text: &str) -> Result<serde_json::Map<String, Value>> {
    let cleaned = strip_code_fences(text)?;
    let value = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(err) => extract_json_from_text(&cleaned)
            .ok_or_else(|| anyhow!("reply JSON failed to parse: {err}"))?,
    };
    match value {
        Value::Object(object) => Ok(object),
        other => Err(anyhow!(
            "reply is not a JSON object (got {})",
            json_kind(&other)
        )),
    }
}

fn strip_code_fences(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        let mut lines: Vec<&str> = trimmed.lines().collect();
        lines.remove(0);
        if lines
            .last()
            .is_some_and(|last| last.trim_start().starts_with("```"))
        {
            lines.pop();
        }
        return Ok(lines.join("\n").trim().to_string());
    }
    let fenced = Regex::new(FENCED_BLOCK).context("compile fence pattern")?;
    if let Some(block) = fenced.captures(trimmed).and_then(|caps| caps.get(1)) {
        return Ok(block.as_str().trim().to_string());
    }
    Ok(trimmed.to_string())
}

fn extract_json_from_text(raw: &str) -> Option<Value> {
    for (idx, ch) in raw.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut deserializer = serde_json::Deserializer::from_str(&raw[idx..]);
        if let Ok(value) = Value::deserialize(&mut deserializer) {
            return Some(value);
        }
    }
    None
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
