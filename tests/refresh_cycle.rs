use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use gvwatch::error::DashError;
use gvwatch::refresh::{
    lock, refresh_cycle, run_periodic, shared, Applied, Pipeline, RefreshController, Status,
};
use gvwatch::source::retry::RetryConfig;
use gvwatch::source::{load_first, DefaultFetcher, Source, SourceFetcher};

fn file(name: &str) -> Source {
    Source::File(PathBuf::from(name))
}

fn not_found(name: &str) -> DashError {
    DashError::HttpStatus {
        source_name: name.to_string(),
        status: 404,
    }
}

/// Fixed answer per source name; unknown names are 404s.
struct MapFetcher {
    bodies: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MapFetcher {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            bodies: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for MapFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, DashError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = source.to_string();
        self.bodies.get(&name).cloned().ok_or_else(|| not_found(&name))
    }
}

/// Hands out scripted results in call order, regardless of source.
struct ScriptFetcher {
    script: Mutex<VecDeque<Result<String, DashError>>>,
}

impl ScriptFetcher {
    fn new(script: Vec<Result<String, DashError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl SourceFetcher for ScriptFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, DashError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_found(&source.to_string())))
    }
}

/// First call blocks until the gate opens; later calls answer at once.
struct GatedFetcher {
    calls: AtomicUsize,
    started: Notify,
    gate: Notify,
}

#[async_trait]
impl SourceFetcher for GatedFetcher {
    async fn fetch(&self, _source: &Source) -> Result<String, DashError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.started.notify_one();
            self.gate.notified().await;
            Ok("scenario\nold\n".to_string())
        } else {
            Ok("scenario\nnew\n".to_string())
        }
    }
}

fn pipeline(fetcher: Arc<dyn SourceFetcher>, candidates: Vec<Source>) -> Arc<Pipeline> {
    Arc::new(Pipeline {
        fetcher,
        candidates,
        retry: RetryConfig::default(),
        tail_rows: 50,
    })
}

#[tokio::test]
async fn http_error_falls_through_to_next_candidate() {
    let fetcher = MapFetcher::new(&[("second.csv", "scenario\na\n")]);
    let candidates = vec![file("first.csv"), file("second.csv")];
    let loaded = load_first(&fetcher, &candidates, &RetryConfig::default())
        .await
        .unwrap();
    assert_eq!(loaded.source, file("second.csv"));
    assert_eq!(loaded.skipped.len(), 1);
    assert_eq!(loaded.skipped[0].reason, "HTTP 404");
}

#[tokio::test]
async fn blank_candidate_falls_through() {
    let fetcher = MapFetcher::new(&[("first.csv", "  \n\n"), ("second.csv", "scenario\na\n")]);
    let candidates = vec![file("first.csv"), file("second.csv")];
    let loaded = load_first(&fetcher, &candidates, &RetryConfig::default())
        .await
        .unwrap();
    assert_eq!(loaded.source, file("second.csv"));
    assert_eq!(loaded.skipped[0].reason, "empty content");
}

#[tokio::test]
async fn all_candidates_failing_lists_every_attempt() {
    let fetcher = MapFetcher::new(&[("second.csv", "")]);
    let candidates = vec![file("first.csv"), file("second.csv")];
    let err = load_first(&fetcher, &candidates, &RetryConfig::default())
        .await
        .unwrap_err();
    match &err {
        DashError::SourceUnavailable { attempts } => assert_eq!(attempts.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("first.csv: HTTP 404"));
    assert!(msg.contains("second.csv: empty content"));
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let fetcher = MapFetcher::new(&[]);
    let retry = RetryConfig {
        max_retries: 3,
        base_delay_ms: 1,
        max_delay_ms: 1,
        jitter_factor: 0.0,
    };
    let _ = load_first(&fetcher, &[file("gone.csv")], &retry).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_errors_are_retried_when_enabled() {
    let fetcher = ScriptFetcher::new(vec![
        Err(DashError::HttpStatus {
            source_name: "h.csv".into(),
            status: 503,
        }),
        Ok("scenario\na\n".to_string()),
    ]);
    let retry = RetryConfig {
        max_retries: 1,
        base_delay_ms: 1,
        max_delay_ms: 1,
        jitter_factor: 0.0,
    };
    let loaded = load_first(&fetcher, &[file("h.csv")], &retry).await.unwrap();
    assert!(loaded.skipped.is_empty());
}

#[tokio::test]
async fn stale_cycle_never_overwrites_newer_result() {
    let fetcher = Arc::new(GatedFetcher {
        calls: AtomicUsize::new(0),
        started: Notify::new(),
        gate: Notify::new(),
    });
    let pipe = pipeline(fetcher.clone(), vec![file("h.csv")]);
    let controller = shared(RefreshController::new(true));

    let slow = {
        let controller = Arc::clone(&controller);
        let pipe = Arc::clone(&pipe);
        tokio::spawn(async move { refresh_cycle(&controller, &pipe).await })
    };
    fetcher.started.notified().await;

    let fast = refresh_cycle(&controller, &pipe).await;
    assert_eq!(fast, Applied::Rendered);

    fetcher.gate.notify_one();
    assert_eq!(slow.await.unwrap(), Applied::Stale);

    let c = lock(&controller);
    assert_eq!(c.state().issued, 2);
    assert_eq!(c.state().applied, 2);
    assert_eq!(c.current_view().unwrap().tiles[0].scenario, "new");
    assert!(matches!(c.state().status, Status::Loaded { .. }));
}

#[tokio::test]
async fn failure_after_success_keeps_last_good_view() {
    let fetcher = Arc::new(ScriptFetcher::new(vec![
        Ok("scenario,final_recoverability\nA,0.9\n".to_string()),
        Err(DashError::Transport {
            source_name: "h.csv".into(),
            reason: "connection refused".into(),
        }),
    ]));
    let pipe = pipeline(fetcher, vec![file("h.csv")]);
    let controller = shared(RefreshController::new(true));

    assert_eq!(refresh_cycle(&controller, &pipe).await, Applied::Rendered);
    assert_eq!(refresh_cycle(&controller, &pipe).await, Applied::Failed);

    let c = lock(&controller);
    assert!(c.state().status_line.starts_with("Refresh failed: no data source found"));
    assert!(c.state().status_line.contains("connection refused"));
    assert_eq!(c.current_view().unwrap().tiles[0].recoverability, "0.9000");
}

#[tokio::test]
async fn header_only_history_is_reported_empty() {
    let fetcher = Arc::new(MapFetcher::new(&[("h.csv", "scenario,run_number\n")]));
    let pipe = pipeline(fetcher, vec![file("h.csv")]);
    let controller = shared(RefreshController::new(true));

    assert_eq!(refresh_cycle(&controller, &pipe).await, Applied::Empty);
    let c = lock(&controller);
    assert_eq!(c.state().status.css_kind(), "empty");
    assert!(c.current_view().is_none());
}

#[tokio::test]
async fn missing_local_file_falls_back_to_existing_one() {
    let dir = TempDir::new().unwrap();
    let present = dir.path().join("summary_history.csv");
    std::fs::write(&present, "scenario,run_number\nA,1\nB,1\n").unwrap();
    let candidates = vec![
        Source::File(dir.path().join("missing.csv")),
        Source::File(present.clone()),
    ];
    let pipe = pipeline(Arc::new(DefaultFetcher::new(5)), candidates);
    let controller = shared(RefreshController::new(false));

    assert_eq!(refresh_cycle(&controller, &pipe).await, Applied::Rendered);
    let c = lock(&controller);
    let snap = c.state().current.as_ref().unwrap();
    assert_eq!(snap.source, present.display().to_string());
    assert_eq!(snap.view.scenario_count, 2);
    assert_eq!(snap.generation, 1);
}

#[tokio::test]
async fn periodic_ticks_follow_auto_refresh_flag() {
    let fetcher = Arc::new(MapFetcher::new(&[("h.csv", "scenario\na\n")]));
    let pipe = pipeline(fetcher.clone(), vec![file("h.csv")]);
    let controller = shared(RefreshController::new(true));

    let ticker = tokio::spawn(run_periodic(
        Arc::clone(&controller),
        Arc::clone(&pipe),
        Duration::from_millis(20),
    ));

    let mut waited = 0;
    while lock(&controller).state().issued < 2 && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    assert!(lock(&controller).state().issued >= 2);
    assert!(matches!(lock(&controller).state().status, Status::Loaded { .. }));

    assert!(!lock(&controller).toggle_auto_refresh());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let issued_off = lock(&controller).state().issued;
    let calls_off = fetcher.calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(lock(&controller).state().issued, issued_off);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), calls_off);

    ticker.abort();
}
