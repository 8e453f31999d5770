//! Enrichment configuration.
//!
//! Provider defaults, prompt variants, and the retry/error policy live in one
//! explicit value that is threaded through the orchestrator and call layer.
//! An optional JSON file overlays the compiled-in defaults.
use crate::enrich::policy::ErrorPolicy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Prompt variant used when `--prompt` is not given.
pub const DEFAULT_PROMPT: &str = "generic";
pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_CHECKPOINT_PATH: &str = "enrichment_checkpoint.json";
pub const DEFAULT_INPUT_CSV: &str = "airport-code-dataset.csv";
pub const DEFAULT_OUTPUT_CSV: &str = "airport-code-dataset-enriched.csv";
pub const DEFAULT_REPORT_HTML: &str = "meanings_comparison.html";

/// Every annotation column carries this prefix.
pub const COLUMN_PREFIX: &str = "meanings_";
/// Placeholder substituted with the batch of codes.
pub const CODES_PLACEHOLDER: &str = "{codes}";

const GENERIC_PROMPT: &str = include_str!("../prompts/generic.md");
const FALSE_POSITIVE_PROMPT: &str = include_str!("../prompts/false_positive.md");

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Chat-completions style API (`/chat/completions`, bearer auth).
    Openai,
    /// Gemini style API (`/models/{model}:generateContent`, API key header).
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model used when neither `--model` nor `LLM_MODEL` is set.
    pub model: String,
    /// Models tried in order once the primary model is unavailable.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Output column for the default prompt variant.
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Same-model retry budget and exponential backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after the 0-based `attempt`: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichConfig {
    pub schema_version: u32,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub prompts: BTreeMap<String, String>,
    pub batch_size: usize,
    pub checkpoint_path: PathBuf,
    pub retry: RetryPolicy,
    pub error_policy: ErrorPolicy,
}

/// On-disk overlay; absent fields keep their defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    schema_version: u32,
    #[serde(default)]
    providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    prompts: BTreeMap<String, String>,
    batch_size: Option<usize>,
    checkpoint_path: Option<PathBuf>,
    retry: Option<RetryPolicy>,
    error_policy: Option<ErrorPolicy>,
}

/// Output column and checkpoint section for one (provider, prompt) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub column: String,
    pub checkpoint_key: String,
}

impl RunTarget {
    /// The default prompt writes to the provider's own column; other variants
    /// append the variant name with `-` replaced by `_`.
    pub fn resolve(provider_id: &str, provider: &ProviderConfig, prompt: &str) -> Self {
        if prompt == DEFAULT_PROMPT {
            return Self {
                column: provider.column.clone(),
                checkpoint_key: provider_id.to_string(),
            };
        }
        let suffix = prompt.replace('-', "_");
        Self {
            column: format!("{}_{suffix}", provider.column),
            checkpoint_key: format!("{provider_id}_{suffix}"),
        }
    }
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "openai".to_string(),
        ProviderConfig {
            kind: ProviderKind::Openai,
            model: "gpt-5.2".to_string(),
            fallbacks: vec![
                "gpt-4o".to_string(),
                "gpt-4o-mini".to_string(),
                "gpt-4.1".to_string(),
            ],
            column: "meanings_openai".to_string(),
            base_url: None,
        },
    );
    providers.insert(
        "gemini".to_string(),
        ProviderConfig {
            kind: ProviderKind::Gemini,
            model: "gemini-2.5-pro".to_string(),
            fallbacks: vec!["gemini-2.0-flash".to_string(), "gemini-1.5-pro".to_string()],
            column: "meanings_gemini".to_string(),
            base_url: None,
        },
    );
    providers
}

fn default_prompts() -> BTreeMap<String, String> {
    let mut prompts = BTreeMap::new();
    prompts.insert(DEFAULT_PROMPT.to_string(), GENERIC_PROMPT.to_string());
    prompts.insert("false-positive".to_string(), FALSE_POSITIVE_PROMPT.to_string());
    prompts
}

/// Build the compiled-in configuration.
pub fn default_config() -> EnrichConfig {
    EnrichConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        providers: default_providers(),
        prompts: default_prompts(),
        batch_size: DEFAULT_BATCH_SIZE,
        checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
        retry: RetryPolicy::default(),
        error_policy: ErrorPolicy::default(),
    }
}

/// Load defaults, overlaid by the JSON file at `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<EnrichConfig> {
    let mut config = default_config();
    let Some(path) = path else {
        return Ok(config);
    };
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let file: ConfigFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    config.schema_version = file.schema_version;
    config.providers.extend(file.providers);
    config.prompts.extend(file.prompts);
    if let Some(batch_size) = file.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(checkpoint_path) = file.checkpoint_path {
        config.checkpoint_path = checkpoint_path;
    }
    if let Some(retry) = file.retry {
        config.retry = retry;
    }
    if let Some(error_policy) = file.error_policy {
        config.error_policy = error_policy;
    }
    Ok(config)
}

/// Reject configurations the pipeline cannot run with.
pub fn validate_config(config: &EnrichConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.batch_size == 0 {
        return Err(anyhow!("batch_size must be at least 1"));
    }
    if config.retry.max_attempts == 0 {
        return Err(anyhow!("retry.max_attempts must be at least 1"));
    }
    for (id, provider) in &config.providers {
        if provider.model.trim().is_empty() {
            return Err(anyhow!("provider {id:?} has an empty model"));
        }
        if !provider.column.starts_with(COLUMN_PREFIX) {
            return Err(anyhow!(
                "provider {id:?} column must start with {COLUMN_PREFIX:?} (got {:?})",
                provider.column
            ));
        }
    }
    for (name, template) in &config.prompts {
        if !template.contains(CODES_PLACEHOLDER) {
            return Err(anyhow!(
                "prompt {name:?} is missing the {CODES_PLACEHOLDER} placeholder"
            ));
        }
    }
    Ok(())
}

impl EnrichConfig {
    pub fn provider(&self, id: &str) -> Result<&ProviderConfig> {
        self.providers.get(id).ok_or_else(|| {
            let known = self.providers.keys().cloned().collect::<Vec<_>>();
            anyhow!("unknown provider {id:?} (known: {})", known.join(", "))
        })
    }

    /// Annotation columns every output file carries, whether or not they ran.
    pub fn provider_columns(&self) -> BTreeSet<String> {
        self.providers
            .values()
            .map(|provider| provider.column.clone())
            .collect()
    }
}

/// Pick the model: explicit flag, then the `LLM_MODEL` value, then the default.
pub fn resolve_model(
    flag: Option<&str>,
    env_model: Option<String>,
    provider: &ProviderConfig,
) -> String {
    flag.map(str::to_string)
        .or(env_model.filter(|model| !model.trim().is_empty()))
        .unwrap_or_else(|| provider.model.clone())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
