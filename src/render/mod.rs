//! View model for the dashboard: tiles for the latest run of each scenario,
//! a latest-per-scenario table and a newest-first tail table.
//!
//! Everything here is owned and serializable so a finished view can be
//! swapped into shared state and served as JSON.

pub mod html;
pub mod text;

use serde::Serialize;

use crate::aggregate::Aggregate;
use crate::classify::{
    behavior_bin, classify_row, parse_finite, Basis, Bucket, Label, MetricChain, CUM_DEVIATION,
    PEAK_RATE, RECOVERABILITY,
};
use crate::data::{field, first_populated, Dataset, Row, CREATED_COLUMNS};
use crate::logging::{v_num, ProfileScope};

pub const DEFAULT_TAIL_ROWS: usize = 50;
pub const SHA_PREFIX_LEN: usize = 7;

/// Table columns shown when present, in display order.
pub const PREFERRED_COLUMNS: [&str; 19] = [
    "scenario",
    "run_number",
    "run_created_utc",
    "git_sha",
    "gv_state",
    "safety_action",
    "interlock_reason",
    "goodness_ratio",
    "final_recoverability",
    "recoverability",
    "final_cum_abs_dgv",
    "cum_abs_dgv",
    "peak_abs_ds_dt",
    "peak_s_total",
    "monitor_alpha",
    "monitor_beta",
    "monitor_gamma",
    "monitor_threshold",
    "behavior_bin",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tile {
    pub scenario: String,
    pub bucket: Bucket,
    pub label: Label,
    pub basis: Basis,
    pub recoverability: String,
    pub cum_deviation: String,
    pub peak_rate: String,
    pub safety_action: Option<String>,
    pub interlock_reason: Option<String>,
    pub goodness_ratio: Option<String>,
    pub behavior: String,
    pub run: String,
    pub sha: String,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub bucket: Bucket,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardView {
    pub tiles: Vec<Tile>,
    pub latest: Table,
    pub tail: Table,
    pub row_count: usize,
    pub scenario_count: usize,
}

impl DashboardView {
    pub fn build(dataset: &Dataset, tail_cap: usize) -> Self {
        let _scope = ProfileScope::with_context(
            "render.view",
            &[("rows", v_num(dataset.rows.len() as f64))],
        );
        let agg = Aggregate::build(&dataset.rows);
        let columns = table_columns(&dataset.headers);

        let tiles = agg
            .latest
            .iter()
            .map(|e| build_tile(e.scenario, e.row, dataset))
            .collect();
        let latest = build_table(&columns, agg.latest.iter().map(|e| e.row));
        let tail = build_table(&columns, agg.ordered.iter().copied().take(tail_cap));

        Self {
            tiles,
            latest,
            tail,
            row_count: dataset.rows.len(),
            scenario_count: agg.scenario_count(),
        }
    }
}

/// Preferred columns that the data actually has, else every header.
pub fn table_columns(headers: &[String]) -> Vec<String> {
    let preferred: Vec<String> = PREFERRED_COLUMNS
        .iter()
        .filter(|c| headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if preferred.is_empty() {
        headers.to_vec()
    } else {
        preferred
    }
}

fn build_table<'a>(columns: &[String], rows: impl Iterator<Item = &'a Row>) -> Table {
    Table {
        columns: columns.to_vec(),
        rows: rows
            .map(|row| TableRow {
                bucket: classify_row(row).bucket,
                cells: columns.iter().map(|c| field(row, c).to_string()).collect(),
            })
            .collect(),
    }
}

fn build_tile(scenario: &str, row: &Row, dataset: &Dataset) -> Tile {
    let class = classify_row(row);
    let annotation = |col: &str| dataset.has_column(col).then(|| field(row, col).to_string());
    let behavior = match field(row, "behavior_bin") {
        "" => behavior_bin(row).as_str().to_string(),
        explicit => explicit.to_string(),
    };

    Tile {
        scenario: scenario.to_string(),
        bucket: class.bucket,
        label: class.label,
        basis: class.basis,
        recoverability: metric_cell(&RECOVERABILITY, row, 4),
        cum_deviation: metric_cell(&CUM_DEVIATION, row, 4),
        peak_rate: metric_cell(&PEAK_RATE, row, 6),
        safety_action: annotation("safety_action"),
        interlock_reason: annotation("interlock_reason"),
        goodness_ratio: annotation("goodness_ratio").map(|raw| fixed_or_raw(&raw, 4)),
        behavior,
        run: first_populated(row, &["run_number", "run_id"])
            .unwrap_or("")
            .to_string(),
        sha: field(row, "git_sha").chars().take(SHA_PREFIX_LEN).collect(),
        created: first_populated(row, &CREATED_COLUMNS)
            .unwrap_or("")
            .to_string(),
    }
}

/// Fixed-precision value of a metric chain; the raw text when nothing in
/// the chain is numeric; "" when the row has none of its columns.
pub fn metric_cell(chain: &MetricChain, row: &Row, digits: usize) -> String {
    match chain.resolve(row) {
        Some(v) => format!("{:.*}", digits, v),
        None => chain.raw(row).unwrap_or("").to_string(),
    }
}

pub fn fixed_or_raw(raw: &str, digits: usize) -> String {
    match parse_finite(raw) {
        Some(v) => format!("{:.*}", digits, v),
        None => raw.to_string(),
    }
}
