//! Batch orchestration.
//!
//! Pending codes are the distinct input codes without a checkpointed result,
//! in first-seen order. Batches run one after another; after each batch the
//! checkpoint and the full output file are rewritten, so a crash loses at most
//! the batch in flight.
use super::call::CallLayer;
use super::call_log::{CallLog, CallLogEntry, CallOutcome};
use super::checkpoint::CheckpointStore;
use super::output::write_output;
use super::provider::AnnotationProvider;
use super::StoredResult;
use crate::config::{EnrichConfig, RunTarget};
use crate::table::{normalize_code, row_code, Row, Table};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::{Instant, SystemTime};

/// Per-invocation parameters resolved from flags and configuration.
pub struct EnrichRun<'a> {
    pub target: &'a RunTarget,
    /// Model for the first batch; later batches start from whichever model
    /// answered the previous one.
    pub model: String,
    pub fallbacks: &'a [String],
    pub template: &'a str,
    pub output_path: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub queried: usize,
    pub batches: usize,
    pub model: String,
}

/// Distinct normalized codes with no result yet, in first-seen order.
pub fn pending_codes(rows: &[Row], results: &BTreeMap<String, StoredResult>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    for row in rows {
        let code = normalize_code(row_code(row));
        if code.is_empty() || results.contains_key(&code) || !seen.insert(code.clone()) {
            continue;
        }
        codes.push(code);
    }
    codes
}

pub fn run_enrichment(
    config: &EnrichConfig,
    provider: &dyn AnnotationProvider,
    store: &CheckpointStore,
    input: &Table,
    run: &EnrichRun<'_>,
    call_log: Option<&CallLog>,
) -> Result<RunSummary> {
    let key = run.target.checkpoint_key.as_str();
    let column = run.target.column.as_str();
    let provider_columns = config.provider_columns();
    let mut checkpoint = store.load(key)?;
    let pending = pending_codes(&input.rows, &checkpoint.results);
    let batch_count = pending.len().div_ceil(config.batch_size);
    let layer = CallLayer::new(provider, config.retry, &config.error_policy);
    let mut model = run.model.clone();

    tracing::info!(
        provider = provider.id(),
        checkpoint_key = key,
        checkpoint = %store.path().display(),
        resolved = checkpoint.results.len(),
        pending = pending.len(),
        batches = batch_count,
        model = model.as_str(),
        "starting enrichment"
    );

    for (index, batch) in pending.chunks(config.batch_size).enumerate() {
        tracing::info!(
            provider = provider.id(),
            batch = index + 1,
            batches = batch_count,
            codes = batch.len(),
            "processing batch"
        );
        let mut entry = CallLogEntry::new(provider.id(), key, &model, batch, SystemTime::now());
        let clock = Instant::now();
        let outcome = layer.call(batch, &model, run.fallbacks, run.template);
        entry.duration_ms = clock.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                entry.error = Some(format!("{err:#}"));
                record(call_log, &entry);
                return Err(err.context(format!("batch {}/{batch_count} failed", index + 1)));
            }
        };
        entry.model_used = Some(result.model.clone());
        entry.attempts = Some(result.attempts);
        entry.outcome = if result.degraded {
            CallOutcome::Empty
        } else {
            CallOutcome::Success
        };

        for code in batch {
            let value = result
                .annotations
                .get(code)
                .cloned()
                .unwrap_or_else(StoredResult::empty);
            let rendered = value.flatten();
            let meanings = if rendered.is_empty() { "-" } else { rendered.as_str() };
            tracing::info!(code = code.as_str(), meanings, "resolved");
            checkpoint.results.insert(code.clone(), value);
        }

        model = result.model;
        checkpoint.model = Some(model.clone());
        store.save(key, &checkpoint)?;
        write_output(
            run.output_path,
            input,
            &checkpoint.results,
            column,
            &provider_columns,
        )?;
        record(call_log, &entry);
    }

    if pending.is_empty() {
        write_output(
            run.output_path,
            input,
            &checkpoint.results,
            column,
            &provider_columns,
        )?;
    }

    Ok(RunSummary {
        rows: input.rows.len(),
        queried: pending.len(),
        batches: batch_count,
        model,
    })
}

/// The call log is advisory: a failed append never costs a batch.
fn record(call_log: Option<&CallLog>, entry: &CallLogEntry) {
    let Some(log) = call_log else {
        return;
    };
    if let Err(err) = log.append(entry) {
        tracing::warn!(error = %format!("{err:#}"), "could not append call log");
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
