//! Run-history CSV ingestion.
//!
//! The tokenizer scans the whole text character by character, so quoted
//! fields may carry commas, doubled quotes and newlines. No column is
//! required: rows are plain name → value maps and every consumer coerces
//! defensively.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub type Row = BTreeMap<String, String>;

/// Columns that may carry a run creation timestamp, most preferred first.
pub const CREATED_COLUMNS: [&str; 3] = ["run_created_utc", "run_created", "created_utc"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}

/// Value of `key` in `row`, or "" when absent.
pub fn field<'a>(row: &'a Row, key: &str) -> &'a str {
    row.get(key).map(String::as_str).unwrap_or("")
}

/// First non-empty value among `keys`.
pub fn first_populated<'a>(row: &'a Row, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .map(|k| field(row, k))
        .find(|v| !v.is_empty())
}

pub fn parse_csv(text: &str) -> Dataset {
    let mut records = tokenize(text).into_iter();
    let headers = match records.next() {
        Some(h) => h,
        None => return Dataset::default(),
    };

    let rows = records
        .map(|fields| {
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), fields.get(i).cloned().unwrap_or_default()))
                .collect::<Row>()
        })
        .collect();

    Dataset { headers, rows }
}

/// Split text into trimmed records, dropping blank ones.
fn tokenize(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => current.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut current).trim().to_string()),
            '\n' => {
                record.push(std::mem::take(&mut current).trim().to_string());
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !record.is_empty() {
        record.push(current.trim().to_string());
        push_record(&mut records, record);
    }
    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].is_empty();
    if !blank {
        records.push(record);
    }
}

/// Serialize back to CSV text, quoting only where a reader would need it.
pub fn write_csv(headers: &[String], rows: &[Row]) -> String {
    let mut out = String::new();
    push_line(&mut out, headers.iter().map(String::as_str));
    for row in rows {
        push_line(&mut out, headers.iter().map(|h| field(row, h)));
    }
    out
}

fn push_line<'a>(out: &mut String, values: impl Iterator<Item = &'a str>) {
    let line = values.map(escape_csv).collect::<Vec<_>>().join(",");
    out.push_str(&line);
    out.push('\n');
}

fn escape_csv(value: &str) -> String {
    let needs_quotes = value.contains([',', '"', '\n', '\r'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn content_sha256(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Timestamp data quality
// =============================================================================

/// Ordering compares creation timestamps as strings, which is only sound
/// for fixed-width ISO-8601 UTC values. This report flags data that breaks
/// that precondition; it never rejects rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampAudit {
    pub populated: usize,
    pub missing: usize,
    pub unparsable: usize,
    pub non_utc: usize,
    pub mixed_widths: bool,
    pub warnings: Vec<String>,
}

impl TimestampAudit {
    pub fn is_clean(&self) -> bool {
        self.unparsable == 0 && self.non_utc == 0 && !self.mixed_widths
    }
}

pub fn audit_timestamps(rows: &[Row]) -> TimestampAudit {
    let mut audit = TimestampAudit::default();
    let mut width: Option<usize> = None;

    for ts in rows.iter().map(|r| first_populated(r, &CREATED_COLUMNS)) {
        let Some(ts) = ts else {
            audit.missing += 1;
            continue;
        };
        audit.populated += 1;
        match width {
            None => width = Some(ts.len()),
            Some(w) if w != ts.len() => audit.mixed_widths = true,
            _ => {}
        }
        match DateTime::parse_from_rfc3339(ts) {
            Ok(dt) if dt.offset().local_minus_utc() != 0 => audit.non_utc += 1,
            Ok(_) => {}
            Err(_) => audit.unparsable += 1,
        }
    }

    if audit.unparsable > 0 {
        audit
            .warnings
            .push(format!("unparsable_timestamps: {}", audit.unparsable));
    }
    if audit.non_utc > 0 {
        audit.warnings.push(format!("non_utc_offsets: {}", audit.non_utc));
    }
    if audit.mixed_widths {
        audit.warnings.push("mixed_timestamp_widths".to_string());
    }
    audit
}
