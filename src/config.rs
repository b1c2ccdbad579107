use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DashError;
use crate::render::DEFAULT_TAIL_ROWS;
use crate::source::retry::RetryConfig;
use crate::source::{Source, DEFAULT_CANDIDATES};

pub const DEFAULT_REFRESH_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardConfig {
    /// CSV locations tried in order (URLs or paths).
    pub candidates: Vec<String>,
    pub refresh_secs: u64,
    pub auto_refresh: bool,
    pub tail_rows: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    pub listen: String,
    pub out_html: String,
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let candidates = get("GV_CSV_CANDIDATES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect());

        Self {
            candidates,
            refresh_secs: parsed(&get, "GV_REFRESH_SECS").unwrap_or(DEFAULT_REFRESH_SECS),
            auto_refresh: get("GV_AUTO_REFRESH")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(true),
            tail_rows: parsed(&get, "GV_TAIL_ROWS").unwrap_or(DEFAULT_TAIL_ROWS),
            fetch_timeout_secs: parsed(&get, "GV_FETCH_TIMEOUT_SECS").unwrap_or(10),
            fetch_retries: parsed(&get, "GV_FETCH_RETRIES").unwrap_or(0),
            listen: get("GV_LISTEN").unwrap_or_else(|| "127.0.0.1:8765".to_string()),
            out_html: get("GV_OUT_HTML").unwrap_or_else(|| "out/dashboard/index.html".to_string()),
        }
    }

    pub fn sources(&self) -> Result<Vec<Source>, DashError> {
        Source::parse_all(&self.candidates)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_retries(self.fetch_retries)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn parsed<T, F>(get: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = DashboardConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.candidates.len(), 2);
        assert_eq!(cfg.candidates[0], "data/longitudinal/summary_history.csv");
        assert_eq!(cfg.refresh_secs, 60);
        assert!(cfg.auto_refresh);
        assert_eq!(cfg.tail_rows, 50);
        assert_eq!(cfg.fetch_retries, 0);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = DashboardConfig::from_lookup(lookup(&[
            ("GV_CSV_CANDIDATES", " https://x.org/a.csv , b.csv ,"),
            ("GV_REFRESH_SECS", "15"),
            ("GV_AUTO_REFRESH", "off"),
            ("GV_TAIL_ROWS", "garbage"),
            ("GV_FETCH_RETRIES", " 2 "),
        ]));
        assert_eq!(cfg.candidates, vec!["https://x.org/a.csv", "b.csv"]);
        assert_eq!(cfg.refresh_secs, 15);
        assert!(!cfg.auto_refresh);
        assert_eq!(cfg.tail_rows, 50);
        assert_eq!(cfg.fetch_retries, 2);
        assert_eq!(cfg.sources().unwrap().len(), 2);
    }

    #[test]
    fn test_config_hash_deterministic() {
        let a = DashboardConfig::from_lookup(lookup(&[]));
        let b = DashboardConfig::from_lookup(lookup(&[]));
        assert_eq!(a.config_hash(), b.config_hash());
        assert_eq!(a.config_hash().len(), 64);
        let c = DashboardConfig { tail_rows: 10, ..a.clone() };
        assert_ne!(a.config_hash(), c.config_hash());
    }
}
