//! Per-row risk triage.
//!
//! Explicit status columns always outrank the numeric heuristic. The
//! heuristic is best-effort triage over whatever metric columns a row
//! carries; it is not a certified safety determination.

use serde::{Deserialize, Serialize};

use crate::data::{field, Dataset, Row};

/// Severity bucket used for visual emphasis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Good,
    Warn,
    Bad,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Good => "good",
            Bucket::Warn => "warn",
            Bucket::Bad => "bad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Good,
    Bad,
    Warn,
    Safe,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Good => "GOOD",
            Label::Bad => "BAD",
            Label::Warn => "WARN",
            Label::Safe => "SAFE",
        }
    }

    fn from_bucket(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Good => Label::Good,
            Bucket::Warn => Label::Warn,
            Bucket::Bad => Label::Bad,
        }
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    SafetyAction,
    GvState,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub bucket: Bucket,
    pub label: Label,
    pub basis: Basis,
}

// =============================================================================
// Metric column chains
// =============================================================================

/// One logical metric and the column names it has carried across schema
/// revisions, newest first.
#[derive(Debug, Clone, Copy)]
pub struct MetricChain {
    pub name: &'static str,
    pub keys: &'static [&'static str],
}

pub const RECOVERABILITY: MetricChain = MetricChain {
    name: "recoverability",
    keys: &["final_recoverability", "recoverability"],
};

pub const CUM_DEVIATION: MetricChain = MetricChain {
    name: "cum_deviation",
    keys: &["final_cum_abs_dgv", "cum_abs_dgv", "final_cum_dgv"],
};

pub const PEAK_RATE: MetricChain = MetricChain {
    name: "peak_rate",
    keys: &["peak_abs_ds_dt", "peak_ds_dt", "peak_abs_dsdt"],
};

/// Finite float from a raw cell; blank, garbage, NaN and infinities are None.
pub fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl MetricChain {
    /// First key in the chain whose value is numeric-coercible.
    pub fn resolve(&self, row: &Row) -> Option<f64> {
        self.keys.iter().find_map(|k| parse_finite(field(row, k)))
    }

    /// First non-empty raw value in the chain, numeric or not.
    pub fn raw<'a>(&self, row: &'a Row) -> Option<&'a str> {
        self.keys
            .iter()
            .map(|k| field(row, k))
            .find(|v| !v.is_empty())
    }
}

// =============================================================================
// Thresholds
// =============================================================================

const R_BAD_BELOW: f64 = 0.35;
const R_WARN_BELOW: f64 = 0.60;
const D_BAD_ABOVE: f64 = 0.9;
const D_WARN_ABOVE: f64 = 0.4;
const P_WARN_ABOVE: f64 = 0.005;

/// Numeric heuristic over the three metric chains; worst metric wins.
pub fn heuristic_bucket(row: &Row) -> Bucket {
    let r = RECOVERABILITY.resolve(row).map(|r| {
        if r < R_BAD_BELOW {
            Bucket::Bad
        } else if r < R_WARN_BELOW {
            Bucket::Warn
        } else {
            Bucket::Good
        }
    });
    let d = CUM_DEVIATION.resolve(row).map(|d| {
        if d > D_BAD_ABOVE {
            Bucket::Bad
        } else if d > D_WARN_ABOVE {
            Bucket::Warn
        } else {
            Bucket::Good
        }
    });
    let p = PEAK_RATE
        .resolve(row)
        .map(|p| if p > P_WARN_ABOVE { Bucket::Warn } else { Bucket::Good });

    [r, d, p]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(Bucket::Good)
}

pub fn classify_row(row: &Row) -> Classification {
    if field(row, "safety_action").eq_ignore_ascii_case("SAFE_REFUSAL") {
        return Classification {
            bucket: Bucket::Good,
            label: Label::Safe,
            basis: Basis::SafetyAction,
        };
    }
    let gv_state = field(row, "gv_state");
    if gv_state.eq_ignore_ascii_case("GOOD") {
        return Classification {
            bucket: Bucket::Good,
            label: Label::Good,
            basis: Basis::GvState,
        };
    }
    if gv_state.eq_ignore_ascii_case("BAD") {
        return Classification {
            bucket: Bucket::Bad,
            label: Label::Bad,
            basis: Basis::GvState,
        };
    }
    let bucket = heuristic_bucket(row);
    Classification {
        bucket,
        label: Label::from_bucket(bucket),
        basis: Basis::Heuristic,
    }
}

// =============================================================================
// Longitudinal behaviour bins
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorBin {
    QuietDegradation,
    ShockRecoverable,
    SaturationDrift,
    Healthy,
}

impl BehaviorBin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorBin::QuietDegradation => "quiet_degradation",
            BehaviorBin::ShockRecoverable => "shock_recoverable",
            BehaviorBin::SaturationDrift => "saturation_drift",
            BehaviorBin::Healthy => "healthy",
        }
    }
}

/// Coarse shape of a run: slow silent decay, sharp but recoverable shock,
/// mid-range saturation, or nothing notable. Missing metrics read as the
/// healthy extreme (R = 1, D = 0, P = 0).
pub fn behavior_bin(row: &Row) -> BehaviorBin {
    let rec = RECOVERABILITY.resolve(row).unwrap_or(1.0);
    let cum = CUM_DEVIATION.resolve(row).unwrap_or(0.0);
    let peak = PEAK_RATE.resolve(row).unwrap_or(0.0);

    if rec < 0.4 && cum < 0.3 && peak < 0.001 {
        BehaviorBin::QuietDegradation
    } else if rec >= 0.6 && (cum > 0.6 || peak > 0.005) {
        BehaviorBin::ShockRecoverable
    } else if (0.4..0.6).contains(&rec) {
        BehaviorBin::SaturationDrift
    } else {
        BehaviorBin::Healthy
    }
}

/// Copy of `dataset` with a `behavior_bin` column stamped on every row.
/// An existing column is overwritten in place.
pub fn with_behavior_bins(dataset: &Dataset) -> Dataset {
    let mut out = dataset.clone();
    if !out.has_column("behavior_bin") {
        out.headers.push("behavior_bin".to_string());
    }
    for row in &mut out.rows {
        let bin = behavior_bin(row);
        row.insert("behavior_bin".to_string(), bin.as_str().to_string());
    }
    out
}
