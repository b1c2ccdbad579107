//! Refresh controller.
//!
//! One `DashboardState` holds everything the display shows. A cycle takes a
//! generation ticket when it starts, fetches and builds its own snapshot
//! without touching shared state, and hands the result back to `finish`.
//! Only the latest issued generation may apply, so a slow cycle can never
//! overwrite a newer one. Failures update the status line and leave the
//! previous snapshot in place.

use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::data::{audit_timestamps, content_sha256, parse_csv, Dataset, TimestampAudit};
use crate::error::DashError;
use crate::logging::{log, log_cycle, obj, ts_now, v_num, v_str, Domain, Level, ProfileScope};
use crate::render::html::PageMeta;
use crate::render::DashboardView;
use crate::source::retry::RetryConfig;
use crate::source::{load_first, Source, SourceFetcher};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    Idle,
    Loading {
        generation: u64,
    },
    Loaded {
        source: String,
        rows: usize,
        scenarios: usize,
        elapsed_ms: u64,
    },
    Empty {
        source: String,
        elapsed_ms: u64,
    },
    Failed {
        message: String,
        elapsed_ms: u64,
    },
}

impl Status {
    pub fn line(&self) -> String {
        match self {
            Status::Idle => "Waiting for first load".to_string(),
            Status::Loading { generation } => format!("Loading (cycle {})", generation),
            Status::Loaded { source, rows, scenarios, elapsed_ms } => format!(
                "Loaded {} rows / {} scenarios from {} in {} ms",
                rows, scenarios, source, elapsed_ms
            ),
            Status::Empty { source, elapsed_ms } => {
                format!("Loaded {} but it holds no rows ({} ms)", source, elapsed_ms)
            }
            Status::Failed { message, elapsed_ms } => {
                format!("Refresh failed: {} ({} ms)", message, elapsed_ms)
            }
        }
    }

    /// CSS class for the status line.
    pub fn css_kind(&self) -> &'static str {
        match self {
            Status::Idle | Status::Loading { .. } => "idle",
            Status::Loaded { .. } => "ok",
            Status::Empty { .. } => "empty",
            Status::Failed { .. } => "error",
        }
    }
}

/// A fully built, displayable result of one successful cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub source: String,
    pub content_sha256: String,
    pub loaded_at: String,
    pub timestamp_audit: TimestampAudit,
    pub view: DashboardView,
    #[serde(skip)]
    pub dataset: Dataset,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub status: Status,
    pub status_line: String,
    pub auto_refresh: bool,
    /// Highest generation handed out by `begin`.
    pub issued: u64,
    /// Generation of the snapshot currently displayed (0 = none).
    pub applied: u64,
    pub current: Option<Snapshot>,
}

#[derive(Debug, Clone, Copy)]
pub struct Ticket {
    pub generation: u64,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    Rendered,
    Empty,
    Failed,
    /// A newer cycle started after this one; its result was dropped.
    Stale,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Applied::Rendered => "applied",
            Applied::Empty => "empty",
            Applied::Failed => "failed",
            Applied::Stale => "stale",
        }
    }
}

#[derive(Debug)]
pub struct RefreshController {
    state: DashboardState,
}

impl RefreshController {
    pub fn new(auto_refresh: bool) -> Self {
        let status = Status::Idle;
        Self {
            state: DashboardState {
                status_line: status.line(),
                status,
                auto_refresh,
                issued: 0,
                applied: 0,
                current: None,
            },
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn auto_refresh(&self) -> bool {
        self.state.auto_refresh
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.state.auto_refresh = enabled;
        log(
            Level::Info,
            Domain::Refresh,
            "auto_refresh",
            obj(&[("enabled", json!(enabled))]),
        );
    }

    pub fn toggle_auto_refresh(&mut self) -> bool {
        let next = !self.state.auto_refresh;
        self.set_auto_refresh(next);
        next
    }

    pub fn begin(&mut self) -> Ticket {
        self.state.issued += 1;
        let generation = self.state.issued;
        self.set_status(Status::Loading { generation });
        Ticket {
            generation,
            started: Instant::now(),
        }
    }

    pub fn finish(&mut self, ticket: Ticket, result: Result<Snapshot, DashError>) -> Applied {
        let elapsed = ticket.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let elapsed_f = elapsed.as_secs_f64() * 1000.0;

        if ticket.generation != self.state.issued {
            log_cycle(
                ticket.generation,
                Applied::Stale.as_str(),
                elapsed_f,
                &[("latest", json!(self.state.issued))],
            );
            return Applied::Stale;
        }

        let applied = match result {
            Ok(mut snapshot) => {
                snapshot.generation = ticket.generation;
                self.set_status(Status::Loaded {
                    source: snapshot.source.clone(),
                    rows: snapshot.view.row_count,
                    scenarios: snapshot.view.scenario_count,
                    elapsed_ms,
                });
                self.state.applied = ticket.generation;
                self.state.current = Some(snapshot);
                Applied::Rendered
            }
            Err(DashError::EmptyDataset { source_name }) => {
                self.set_status(Status::Empty {
                    source: source_name,
                    elapsed_ms,
                });
                Applied::Empty
            }
            Err(err) => {
                self.set_status(Status::Failed {
                    message: err.to_string(),
                    elapsed_ms,
                });
                Applied::Failed
            }
        };
        log_cycle(
            ticket.generation,
            applied.as_str(),
            elapsed_f,
            &[("status", v_str(&self.state.status_line))],
        );
        applied
    }

    fn set_status(&mut self, status: Status) {
        self.state.status_line = status.line();
        self.state.status = status;
    }

    /// Page chrome for the HTML renderer.
    pub fn page_meta(&self, refresh_secs: u64, controls: bool) -> PageMeta<'_> {
        let current = self.state.current.as_ref();
        PageMeta {
            status: &self.state.status_line,
            status_kind: self.state.status.css_kind(),
            source: current.map(|s| s.source.as_str()),
            content_sha: current.map(|s| s.content_sha256.as_str()),
            loaded_at: current.map(|s| s.loaded_at.as_str()),
            auto_refresh: self.state.auto_refresh,
            refresh_secs,
            controls,
        }
    }

    pub fn current_view(&self) -> Option<&DashboardView> {
        self.state.current.as_ref().map(|s| &s.view)
    }
}

// =============================================================================
// Pipeline: fetch → parse → aggregate → view
// =============================================================================

pub struct Pipeline {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub candidates: Vec<Source>,
    pub retry: RetryConfig,
    pub tail_rows: usize,
}

impl Pipeline {
    /// Fetch the first available candidate and build a snapshot from it.
    /// The returned snapshot carries generation 0 until `finish` stamps it.
    pub async fn run(&self) -> Result<Snapshot, DashError> {
        let loaded = load_first(self.fetcher.as_ref(), &self.candidates, &self.retry).await?;
        let source = loaded.source.to_string();
        build_snapshot(source, &loaded.text, self.tail_rows)
    }
}

/// Synchronous half of a cycle; runs to completion without yielding.
pub fn build_snapshot(source: String, text: &str, tail_rows: usize) -> Result<Snapshot, DashError> {
    let dataset = {
        let _scope = ProfileScope::with_context("parse", &[("bytes", v_num(text.len() as f64))]);
        parse_csv(text)
    };
    if dataset.is_empty() {
        return Err(DashError::EmptyDataset { source_name: source });
    }

    let audit = audit_timestamps(&dataset.rows);
    if !audit.is_clean() {
        log(
            Level::Warn,
            Domain::Parse,
            "timestamp_quality",
            obj(&[
                ("source", v_str(&source)),
                ("warnings", json!(audit.warnings)),
            ]),
        );
    }

    let view = DashboardView::build(&dataset, tail_rows);
    Ok(Snapshot {
        generation: 0,
        content_sha256: content_sha256(text),
        loaded_at: ts_now(),
        timestamp_audit: audit,
        view,
        dataset,
        source,
    })
}

pub type SharedController = Arc<Mutex<RefreshController>>;

pub fn shared(controller: RefreshController) -> SharedController {
    Arc::new(Mutex::new(controller))
}

/// Lock the controller, recovering the state if a holder panicked.
pub fn lock(shared: &SharedController) -> MutexGuard<'_, RefreshController> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One complete cycle against shared state. The lock is never held across
/// the fetch.
pub async fn refresh_cycle(shared: &SharedController, pipeline: &Pipeline) -> Applied {
    let ticket = lock(shared).begin();
    let result = pipeline.run().await;
    lock(shared).finish(ticket, result)
}

/// Periodic trigger; each tick runs a cycle only while auto-refresh is on.
pub async fn run_periodic(shared: SharedController, pipeline: Arc<Pipeline>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the caller already did the initial load.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let enabled = lock(&shared).auto_refresh();
        if enabled {
            refresh_cycle(&shared, &pipeline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(text: &str) -> Result<Snapshot, DashError> {
        build_snapshot("mem".to_string(), text, 50)
    }

    #[test]
    fn test_initial_state() {
        let c = RefreshController::new(true);
        assert_eq!(c.state().status, Status::Idle);
        assert_eq!(c.state().issued, 0);
        assert!(c.current_view().is_none());
    }

    #[test]
    fn test_success_applies_snapshot() {
        let mut c = RefreshController::new(true);
        let t = c.begin();
        assert!(matches!(c.state().status, Status::Loading { generation: 1 }));
        let applied = c.finish(t, snapshot("scenario\na\nb\n"));
        assert_eq!(applied, Applied::Rendered);
        assert_eq!(c.state().applied, 1);
        assert_eq!(c.current_view().unwrap().scenario_count, 2);
        assert!(c.state().status_line.starts_with("Loaded 2 rows / 2 scenarios from mem"));
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let mut c = RefreshController::new(true);
        let slow = c.begin();
        let fast = c.begin();
        assert_eq!(c.finish(fast, snapshot("scenario\nnew\n")), Applied::Rendered);
        assert_eq!(c.finish(slow, snapshot("scenario\nold\n")), Applied::Stale);
        let tile = &c.current_view().unwrap().tiles[0];
        assert_eq!(tile.scenario, "new");
        assert_eq!(c.state().applied, 2);
    }

    #[test]
    fn test_stale_failure_does_not_touch_status() {
        let mut c = RefreshController::new(true);
        let slow = c.begin();
        let fast = c.begin();
        c.finish(fast, snapshot("scenario\nx\n"));
        let line = c.state().status_line.clone();
        let err = DashError::SourceUnavailable { attempts: vec![] };
        assert_eq!(c.finish(slow, Err(err)), Applied::Stale);
        assert_eq!(c.state().status_line, line);
    }

    #[test]
    fn test_failure_keeps_previous_snapshot() {
        let mut c = RefreshController::new(true);
        let t = c.begin();
        c.finish(t, snapshot("scenario\nkept\n"));
        let t = c.begin();
        let applied = c.finish(t, Err(DashError::SourceUnavailable { attempts: vec![] }));
        assert_eq!(applied, Applied::Failed);
        assert_eq!(c.state().status.css_kind(), "error");
        assert!(c.state().status_line.contains("no data source found"));
        assert_eq!(c.current_view().unwrap().tiles[0].scenario, "kept");
        assert_eq!(c.state().applied, 1);
    }

    #[test]
    fn test_empty_dataset_has_distinct_status() {
        let mut c = RefreshController::new(true);
        let t = c.begin();
        c.finish(t, snapshot("scenario\nkept\n"));
        let t = c.begin();
        let applied = c.finish(t, snapshot("scenario,run_number\n"));
        assert_eq!(applied, Applied::Empty);
        assert!(matches!(c.state().status, Status::Empty { .. }));
        assert_eq!(c.current_view().unwrap().tiles[0].scenario, "kept");
    }

    #[test]
    fn test_toggle_auto_refresh() {
        let mut c = RefreshController::new(true);
        assert!(!c.toggle_auto_refresh());
        assert!(!c.auto_refresh());
        assert!(c.toggle_auto_refresh());
    }

    #[test]
    fn test_page_meta_reflects_state() {
        let mut c = RefreshController::new(false);
        let t = c.begin();
        c.finish(t, snapshot("scenario\na\n"));
        let meta = c.page_meta(60, true);
        assert_eq!(meta.source, Some("mem"));
        assert_eq!(meta.status_kind, "ok");
        assert!(!meta.auto_refresh);
        assert_eq!(meta.content_sha.map(str::len), Some(64));
    }
}
