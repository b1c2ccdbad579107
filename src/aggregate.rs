//! Recency ordering and latest-run-per-scenario selection.
//!
//! Timestamps compare as plain strings. That is correct only when every
//! value shares one fixed-width ISO-8601 UTC layout; `data::audit_timestamps`
//! reports inputs that break this precondition.

use std::cmp::Ordering;

use serde::Serialize;

use crate::data::{field, first_populated, Row, CREATED_COLUMNS};
use crate::logging::ProfileScope;

pub const UNKNOWN_SCENARIO: &str = "unknown";

/// Grouping key: `scenario`, else `case`, else "unknown".
pub fn scenario_key(row: &Row) -> &str {
    first_populated(row, &["scenario", "case"]).unwrap_or(UNKNOWN_SCENARIO)
}

/// (creation timestamp, run sequence); missing sequence is -1.
#[derive(Debug, Clone, Serialize)]
pub struct RecencyKey<'a> {
    pub created: &'a str,
    pub run: f64,
}

impl<'a> RecencyKey<'a> {
    pub fn of(row: &'a Row) -> Self {
        let run = field(row, "run_number")
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(-1.0);
        Self {
            created: first_populated(row, &CREATED_COLUMNS).unwrap_or(""),
            run,
        }
    }
}

impl PartialEq for RecencyKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RecencyKey<'_> {}

impl PartialOrd for RecencyKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecencyKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created
            .cmp(other.created)
            .then_with(|| self.run.total_cmp(&other.run))
    }
}

/// Rows sorted newest first. Stable, so fully tied rows keep input order.
pub fn newest_first(rows: &[Row]) -> Vec<&Row> {
    let mut out: Vec<&Row> = rows.iter().collect();
    out.sort_by(|a, b| RecencyKey::of(b).cmp(&RecencyKey::of(a)));
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioLatest<'a> {
    pub scenario: &'a str,
    pub row: &'a Row,
}

/// One most-recent row per scenario, ordered by scenario name.
pub fn latest_per_scenario(rows: &[Row]) -> Vec<ScenarioLatest<'_>> {
    let mut latest: Vec<ScenarioLatest<'_>> = Vec::new();
    for row in rows {
        let key = scenario_key(row);
        match latest.iter_mut().find(|e| e.scenario == key) {
            Some(kept) => {
                if RecencyKey::of(row) > RecencyKey::of(kept.row) {
                    kept.row = row;
                }
            }
            None => latest.push(ScenarioLatest { scenario: key, row }),
        }
    }
    latest.sort_by(|a, b| locale_cmp(a.scenario, b.scenario));
    latest
}

/// Approximates a locale collation: case-insensitive first, exact bytes
/// as the tiebreak so the order stays total.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Everything the renderer needs from one parsed dataset.
#[derive(Debug, Clone)]
pub struct Aggregate<'a> {
    pub latest: Vec<ScenarioLatest<'a>>,
    pub ordered: Vec<&'a Row>,
}

impl<'a> Aggregate<'a> {
    pub fn build(rows: &'a [Row]) -> Self {
        let _scope = ProfileScope::new("aggregate");
        Self {
            latest: latest_per_scenario(rows),
            ordered: newest_first(rows),
        }
    }

    pub fn scenario_count(&self) -> usize {
        self.latest.len()
    }
}
