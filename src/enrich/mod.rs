//! Batch enrichment of codes with LM-provided meanings.
//!
//! The pipeline is strictly sequential: pending codes are batched, each batch
//! goes through the resilient call layer, and the checkpoint plus the output
//! CSV are rewritten after every batch so an interrupted run resumes exactly
//! where it stopped.

pub mod batch;
pub mod call;
pub mod call_log;
pub mod checkpoint;
pub mod output;
pub mod policy;
pub mod prompt;
pub mod provider;
pub mod response;
#[cfg(test)]
pub(crate) mod test_support;

use crate::cli::EnrichArgs;
use crate::config::{load_config, resolve_model, validate_config, RunTarget};
use crate::table::{read_table, CODE_COLUMN};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;

use batch::{run_enrichment, EnrichRun};
use call_log::CallLog;
use checkpoint::CheckpointStore;
use prompt::prompt_template;
use provider::build_provider;

/// Meanings found for one code by one (provider, prompt) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub word: Option<String>,
    /// Entries shaped like `"domain: meaning"`.
    #[serde(default)]
    pub abbreviations: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Checkpointed result for one code.
///
/// Older checkpoints hold flattened strings; new results keep the structure.
/// The empty string means no meaning was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredResult {
    Annotation(Annotation),
    Text(String),
}

impl Annotation {
    /// Tolerant extraction from a reply object; `None` for non-objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let abbreviations = match object.get("abbreviations") {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            Some(other) => scalar_text(other).into_iter().collect(),
            None => Vec::new(),
        };
        Some(Self {
            word: object.get("word").and_then(scalar_text),
            abbreviations,
            notes: object.get("notes").and_then(scalar_text),
        })
    }

    /// Word first, then abbreviation meanings without their `domain: `
    /// prefix, deduplicated, joined by `"; "`.
    pub fn flatten(&self) -> String {
        let mut values: Vec<String> = Vec::new();
        if let Some(word) = self.word.as_deref().filter(|word| !word.is_empty()) {
            values.push(word.to_string());
        }
        for abbreviation in &self.abbreviations {
            let meaning = match abbreviation.split_once(": ") {
                Some((_, meaning)) => meaning,
                None => abbreviation.as_str(),
            };
            if !meaning.is_empty() && !values.iter().any(|value| value == meaning) {
                values.push(meaning.to_string());
            }
        }
        values.join("; ")
    }
}

impl StoredResult {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    /// Convert one per-code value of a parsed reply.
    pub fn from_reply_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::empty(),
            Value::String(text) => Self::Text(text.clone()),
            Value::Object(_) => Annotation::from_value(value)
                .map(Self::Annotation)
                .unwrap_or_else(|| Self::Text(value.to_string())),
            other => Self::Text(other.to_string()),
        }
    }

    /// Cell text for the output CSV.
    pub fn flatten(&self) -> String {
        match self {
            Self::Annotation(annotation) => annotation.flatten(),
            Self::Text(text) if text.starts_with('{') => {
                match serde_json::from_str::<Value>(text) {
                    Ok(value) => Annotation::from_value(&value)
                        .map(|annotation| annotation.flatten())
                        .unwrap_or_else(|| text.clone()),
                    Err(_) => text.clone(),
                }
            }
            Self::Text(text) => text.clone(),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(_) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Entry point for `meanings enrich`.
pub fn run_enrich(args: &EnrichArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(checkpoint) = &args.checkpoint {
        config.checkpoint_path = checkpoint.clone();
    }
    validate_config(&config)?;

    if !args.input.exists() {
        return Err(anyhow!("input file not found: {}", args.input.display()));
    }
    let provider_config = config.provider(&args.provider)?;
    let template = prompt_template(&config, &args.prompt)?;
    let target = RunTarget::resolve(&args.provider, provider_config, &args.prompt);
    let model = resolve_model(
        args.model.as_deref(),
        env::var("LLM_MODEL").ok(),
        provider_config,
    );
    let provider = build_provider(&args.provider, provider_config)?;

    let input = read_table(&args.input)?;
    if !input.has_column(CODE_COLUMN) {
        return Err(anyhow!(
            "input {} has no {CODE_COLUMN:?} column",
            args.input.display()
        ));
    }

    let store = CheckpointStore::new(config.checkpoint_path.clone());
    let call_log = args.call_log.clone().map(CallLog::new);
    let run = EnrichRun {
        target: &target,
        model,
        fallbacks: &provider_config.fallbacks,
        template,
        output_path: &args.output,
    };
    let summary = run_enrichment(
        &config,
        provider.as_ref(),
        &store,
        &input,
        &run,
        call_log.as_ref(),
    )?;

    println!(
        "[{}] Done. Wrote {} with {} rows ({} codes queried in {} batches, model {}).",
        args.provider,
        args.output.display(),
        summary.rows,
        summary.queried,
        summary.batches,
        summary.model
    );
    Ok(())
}
