//! Append-only JSONL record of batch calls.
//!
//! One line per batch so a long run can be audited afterwards: which model
//! answered, how many requests it took, and which batches came back empty.
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"provider":"openai","checkpoint_key":"openai",...}
//! ```
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CALL_LOG_SCHEMA_VERSION: u32 = 1;

/// Codes kept per entry for quick reference.
const CODES_PREVIEW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    /// Reply never parsed; batch recorded with no meanings.
    Empty,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub schema_version: u32,
    /// Unix timestamp in milliseconds when the call started.
    pub ts: u64,
    pub provider: String,
    pub checkpoint_key: String,
    pub requested_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub codes_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub outcome: CallOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallLogEntry {
    /// Entry for a call that started at `started` over `codes`.
    pub fn new(
        provider: &str,
        checkpoint_key: &str,
        requested_model: &str,
        codes: &[String],
        started: SystemTime,
    ) -> Self {
        Self {
            schema_version: CALL_LOG_SCHEMA_VERSION,
            ts: unix_millis(started),
            provider: provider.to_string(),
            checkpoint_key: checkpoint_key.to_string(),
            requested_model: requested_model.to_string(),
            model_used: None,
            codes_count: codes.len(),
            codes: codes.iter().take(CODES_PREVIEW).cloned().collect(),
            attempts: None,
            outcome: CallOutcome::Failed,
            duration_ms: 0,
            error: None,
        }
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct CallLog {
    path: PathBuf,
}

impl CallLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, entry: &CallLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let line = serde_json::to_string(entry).context("serialize call log entry")?;
        writeln!(file, "{line}").with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}
