//! Delimited-text ingestion.
//!
//! Each source arrives as header-first delimited text. Column kinds are
//! inferred: a column is Numeric when every non-empty value parses as a
//! finite number, Text otherwise. Columns named in `text_columns` (entity
//! keys) are always Text so identifiers like "007" survive intact.

use crate::{
    config::SourceConfig,
    error::{PipelineError, PipelineResult},
    table::{Cell, ColumnDescriptor, ColumnKind, SourceTable, TableSchema},
};
use std::path::Path;

/// Values treated as missing, compared case-insensitively after trimming.
const NULL_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null"];

/// Load one configured source from disk.
pub fn load_source(name: &str, source: &SourceConfig, text_columns: &[&str]) -> PipelineResult<SourceTable> {
    let path = Path::new(&source.path);
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Other(anyhow::anyhow!("Cannot read {}: {e}", path.display()))
    })?;
    let table = read_delimited(name, &content, source.delimiter, text_columns)?;
    log::info!(
        "Loaded source '{name}' from {}: {} rows x {} columns",
        path.display(),
        table.row_count(),
        table.schema.len()
    );
    Ok(table)
}

/// Parse delimited text with a header row into a typed table.
pub fn read_delimited(
    name: &str,
    content: &str,
    delimiter: char,
    text_columns: &[&str],
) -> PipelineResult<SourceTable> {
    if !delimiter.is_ascii() {
        return Err(PipelineError::Config(format!(
            "source '{name}': delimiter {delimiter:?} is not a single-byte character"
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::schema(name, "missing header row"));
    }

    let mut raw: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw.push(record.iter().map(|f| f.to_string()).collect());
    }

    let kinds: Vec<ColumnKind> = headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            if text_columns.contains(&header.as_str()) {
                return ColumnKind::Text;
            }
            let numeric = raw
                .iter()
                .map(|row| row[col].as_str())
                .filter(|v| !is_null_token(v))
                .all(|v| parse_number(v).is_some());
            if numeric { ColumnKind::Numeric } else { ColumnKind::Text }
        })
        .collect();

    let schema = TableSchema::new(
        headers
            .iter()
            .zip(&kinds)
            .map(|(h, k)| ColumnDescriptor { name: h.clone(), kind: *k })
            .collect(),
    );

    let rows = raw
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(value, kind)| to_cell(value, *kind))
                .collect()
        })
        .collect();

    SourceTable::new(name, schema, rows)
}

fn to_cell(value: String, kind: ColumnKind) -> Cell {
    if is_null_token(&value) {
        return Cell::Null;
    }
    match kind {
        ColumnKind::Numeric => parse_number(&value).map(Cell::Number).unwrap_or(Cell::Null),
        ColumnKind::Text => Cell::Text(value),
    }
}

fn is_null_token(value: &str) -> bool {
    let v = value.trim();
    NULL_TOKENS.iter().any(|t| v.eq_ignore_ascii_case(t))
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
