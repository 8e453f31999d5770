//! CSV tables keyed by header name.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Column every input file must carry.
pub const CODE_COLUMN: &str = "code";

pub type Row = BTreeMap<String, String>;

/// Header order plus rows; a row may lack fields the header names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }
}

/// Trimmed code of a row as written in the file.
pub fn row_code(row: &Row) -> &str {
    row.get(CODE_COLUMN).map(|code| code.trim()).unwrap_or("")
}

/// Normalized pipeline key: trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("read row {} of {}", index + 1, path.display()))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(Table { headers, rows })
}

/// Write `rows` under `headers`; missing fields become empty cells.
pub fn write_table(path: &Path, headers: &[String], rows: &[Row]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(headers)
        .with_context(|| format!("write header to {}", path.display()))?;
    for row in rows {
        let record = headers
            .iter()
            .map(|header| row.get(header).map(String::as_str).unwrap_or(""));
        writer
            .write_record(record)
            .with_context(|| format!("write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}
