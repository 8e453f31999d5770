//! Wide output CSV: input columns plus one column per (provider, prompt).
//!
//! Each run owns exactly one target column. Every other annotation column is
//! copied from the previous output file for rows with the same code, so runs
//! for different providers and prompts accumulate in one file.
use super::StoredResult;
use crate::config::COLUMN_PREFIX;
use crate::table::{normalize_code, read_table, row_code, write_table, Row, Table};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Provider default columns, annotation columns already present in the
/// previous output, and the target column.
pub fn known_columns(
    provider_columns: &BTreeSet<String>,
    prior: Option<&Table>,
    target: &str,
) -> BTreeSet<String> {
    let mut known = provider_columns.clone();
    if let Some(prior) = prior {
        known.extend(
            prior
                .headers
                .iter()
                .filter(|header| header.starts_with(COLUMN_PREFIX))
                .cloned(),
        );
    }
    known.insert(target.to_string());
    known
}

/// Build the output table for this run.
pub fn merge_output(
    input: &Table,
    results: &BTreeMap<String, StoredResult>,
    target: &str,
    known: &BTreeSet<String>,
    prior: Option<&Table>,
) -> Table {
    let mut headers = input.headers.clone();
    for column in known {
        if !headers.contains(column) {
            headers.push(column.clone());
        }
    }

    let prior_rows: HashMap<&str, &Row> = prior
        .map(|prior| prior.rows.iter().map(|row| (row_code(row), row)).collect())
        .unwrap_or_default();

    let rows = input
        .rows
        .iter()
        .map(|row| {
            let mut merged = row.clone();
            let code = row_code(row);
            if let Some(previous) = prior_rows.get(code) {
                for column in known.iter().filter(|column| *column != target) {
                    if let Some(value) = previous.get(column) {
                        merged.insert(column.clone(), value.clone());
                    }
                }
            }
            let value = results
                .get(&normalize_code(code))
                .map(StoredResult::flatten)
                .unwrap_or_default();
            merged.insert(target.to_string(), value);
            merged
        })
        .collect();

    Table { headers, rows }
}

/// Rewrite `path` with this run's column merged into the previous output.
pub fn write_output(
    path: &Path,
    input: &Table,
    results: &BTreeMap<String, StoredResult>,
    target: &str,
    provider_columns: &BTreeSet<String>,
) -> Result<()> {
    let prior = if path.exists() {
        Some(read_table(path)?)
    } else {
        None
    };
    let known = known_columns(provider_columns, prior.as_ref(), target);
    let merged = merge_output(input, results, target, &known, prior.as_ref());
    write_table(path, &merged.headers, &merged.rows)
}
