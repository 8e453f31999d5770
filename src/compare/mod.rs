//! Comparison statistics over the annotation columns of an enriched CSV.
//!
//! Everything here is deterministic for a given input: columns are sorted,
//! pairs follow column order, and top-code ties keep first-seen row order.
mod render;

use crate::cli::CompareArgs;
use crate::config::COLUMN_PREFIX;
use crate::table::{normalize_code, read_table, row_code, Table};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;

pub use render::render_html;

pub const TOP_CODES_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    /// Codes with at least one meaning.
    pub count: usize,
    pub pct: f64,
    pub total_meanings: usize,
    pub avg: f64,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairOverlap {
    pub a: String,
    pub b: String,
    pub both: usize,
    pub only_a: usize,
    pub only_b: usize,
    pub jaccard: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallOverlap {
    pub any: usize,
    pub any_pct: f64,
    pub all: usize,
    pub all_pct: f64,
    pub none: usize,
    pub none_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairAgreement {
    pub a: String,
    pub b: String,
    pub shared_codes: usize,
    pub agree_count: usize,
    pub agree_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopCode {
    pub code: String,
    /// Distinct normalized meanings across all columns.
    pub distinct: usize,
    /// Column -> raw meanings; columns without meanings are absent.
    pub meanings: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonStats {
    pub total: usize,
    pub columns: Vec<String>,
    pub per_column: Vec<ColumnStats>,
    pub pairwise: Vec<PairOverlap>,
    pub overlap: OverallOverlap,
    pub agreement: Vec<PairAgreement>,
    pub top_codes: Vec<TopCode>,
}

/// Annotation columns of `headers`, sorted.
pub fn detect_columns(headers: &[String]) -> Vec<String> {
    let columns: BTreeSet<&String> = headers
        .iter()
        .filter(|header| header.starts_with(COLUMN_PREFIX))
        .collect();
    columns.into_iter().cloned().collect()
}

/// Split a `;`-separated cell into trimmed, non-empty meanings.
pub fn parse_meanings(cell: &str) -> Vec<String> {
    cell.split(';')
        .map(str::trim)
        .filter(|meaning| !meaning.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lowercase, trim, and drop everything from the first `(`.
pub fn normalize_meaning(meaning: &str) -> String {
    let lowered = meaning.trim().to_lowercase();
    match lowered.split_once('(') {
        Some((head, _)) => head.trim().to_string(),
        None => lowered,
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Per-code meanings, keyed by column; the last non-empty cell for a code wins.
struct CodeMeanings {
    order: Vec<String>,
    by_code: HashMap<String, BTreeMap<String, Vec<String>>>,
}

impl CodeMeanings {
    fn collect(table: &Table, columns: &[String]) -> Self {
        let mut order = Vec::new();
        let mut by_code: HashMap<String, BTreeMap<String, Vec<String>>> = HashMap::new();
        for row in &table.rows {
            let code = normalize_code(row_code(row));
            if code.is_empty() {
                continue;
            }
            let entry = by_code.entry(code.clone()).or_insert_with(|| {
                order.push(code);
                BTreeMap::new()
            });
            for column in columns {
                let meanings = parse_meanings(row.get(column).map(String::as_str).unwrap_or(""));
                if !meanings.is_empty() {
                    entry.insert(column.clone(), meanings);
                }
            }
        }
        Self { order, by_code }
    }

    fn codes_with(&self, column: &str) -> BTreeSet<&str> {
        self.by_code
            .iter()
            .filter(|(_, columns)| columns.contains_key(column))
            .map(|(code, _)| code.as_str())
            .collect()
    }

    fn normalized(&self, code: &str, column: &str) -> BTreeSet<String> {
        self.by_code
            .get(code)
            .and_then(|columns| columns.get(column))
            .map(|meanings| meanings.iter().map(|m| normalize_meaning(m)).collect())
            .unwrap_or_default()
    }
}

pub fn compute_stats(table: &Table, columns: &[String]) -> ComparisonStats {
    let total = table.rows.len();
    let meanings = CodeMeanings::collect(table, columns);
    let coverage: Vec<BTreeSet<&str>> = columns
        .iter()
        .map(|column| meanings.codes_with(column))
        .collect();

    let per_column = columns
        .iter()
        .zip(&coverage)
        .map(|(column, codes)| {
            let counts: Vec<usize> = codes
                .iter()
                .filter_map(|code| meanings.by_code.get(*code)?.get(column))
                .map(Vec::len)
                .collect();
            let total_meanings: usize = counts.iter().sum();
            ColumnStats {
                column: column.clone(),
                count: codes.len(),
                pct: percent(codes.len(), total),
                total_meanings,
                avg: if codes.is_empty() {
                    0.0
                } else {
                    total_meanings as f64 / codes.len() as f64
                },
                min: counts.iter().copied().min().unwrap_or(0),
                max: counts.iter().copied().max().unwrap_or(0),
            }
        })
        .collect();

    let mut pairwise = Vec::new();
    let mut agreement = Vec::new();
    for (i, (a_column, a)) in columns.iter().zip(&coverage).enumerate() {
        for (b_column, b) in columns.iter().zip(&coverage).skip(i + 1) {
            let both: Vec<&str> = a.intersection(b).copied().collect();
            let union = a.union(b).count();
            pairwise.push(PairOverlap {
                a: a_column.clone(),
                b: b_column.clone(),
                both: both.len(),
                only_a: a.difference(b).count(),
                only_b: b.difference(a).count(),
                jaccard: if union == 0 {
                    0.0
                } else {
                    both.len() as f64 / union as f64
                },
            });

            let agree_count = both
                .iter()
                .filter(|code| {
                    let left = meanings.normalized(code, a_column);
                    let right = meanings.normalized(code, b_column);
                    !left.is_disjoint(&right)
                })
                .count();
            agreement.push(PairAgreement {
                a: a_column.clone(),
                b: b_column.clone(),
                shared_codes: both.len(),
                agree_count,
                agree_pct: percent(agree_count, both.len()),
            });
        }
    }

    let any: BTreeSet<&str> = coverage.iter().flatten().copied().collect();
    let all = match coverage.split_first() {
        Some((first, rest)) => first
            .iter()
            .filter(|code| rest.iter().all(|other| other.contains(*code)))
            .count(),
        None => 0,
    };
    let none = total.saturating_sub(any.len());
    let overlap = OverallOverlap {
        any: any.len(),
        any_pct: percent(any.len(), total),
        all,
        all_pct: percent(all, total),
        none,
        none_pct: percent(none, total),
    };

    ComparisonStats {
        total,
        columns: columns.to_vec(),
        per_column,
        pairwise,
        overlap,
        agreement,
        top_codes: top_codes(&meanings),
    }
}

fn top_codes(meanings: &CodeMeanings) -> Vec<TopCode> {
    let mut ranked: Vec<TopCode> = meanings
        .order
        .iter()
        .filter_map(|code| {
            let columns = meanings.by_code.get(code)?;
            if columns.is_empty() {
                return None;
            }
            let distinct: BTreeSet<String> = columns
                .values()
                .flatten()
                .map(|meaning| normalize_meaning(meaning))
                .collect();
            Some(TopCode {
                code: code.clone(),
                distinct: distinct.len(),
                meanings: columns.clone(),
            })
        })
        .collect();
    // Stable sort keeps first-seen order among ties.
    ranked.sort_by(|a, b| b.distinct.cmp(&a.distinct));
    ranked.truncate(TOP_CODES_LIMIT);
    ranked
}

/// Entry point for `meanings compare`.
pub fn run_compare(args: &CompareArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(anyhow!("input file not found: {}", args.input.display()));
    }
    let table = read_table(&args.input)?;
    let columns = detect_columns(&table.headers);
    if columns.is_empty() {
        return Err(anyhow!(
            "no {COLUMN_PREFIX}* columns found in {}",
            args.input.display()
        ));
    }

    let stats = compute_stats(&table, &columns);
    tracing::info!(
        rows = stats.total,
        columns = columns.len(),
        pairs = stats.pairwise.len(),
        "computed comparison statistics"
    );
    fs::write(&args.output, render_html(&stats))
        .with_context(|| format!("write {}", args.output.display()))?;

    if args.json {
        let text = serde_json::to_string_pretty(&stats).context("serialize statistics")?;
        println!("{text}");
    }
    println!(
        "Report written to {} ({} codes, {} columns)",
        args.output.display(),
        render::group_thousands(stats.total),
        columns.len()
    );
    Ok(())
}
