use gvwatch::aggregate::{latest_per_scenario, newest_first};
use gvwatch::classify::{classify_row, Basis, Bucket, Label};
use gvwatch::data::{field, parse_csv, write_csv};
use gvwatch::refresh::build_snapshot;
use gvwatch::render::html::{render_page, PageMeta};
use gvwatch::render::DashboardView;

const HISTORY: &str = "\
run_created_utc,run_number,git_sha,scenario,gv_state,safety_action,final_recoverability,final_cum_abs_dgv,peak_abs_ds_dt
2025-01-01T00:00:00Z,1,aaaaaaaaaaaa,A,,,0.2,0.1,0.0001
2025-01-02T00:00:00Z,2,bbbbbbbbbbbb,A,,,0.8,0.1,0.0001
2025-01-02T00:00:00Z,2,bbbbbbbbbbbb,B,BAD,,0.9,0.0,0.0
2025-01-01T00:00:00Z,1,aaaaaaaaaaaa,B,,SAFE_REFUSAL,0.1,2.0,0.1
";

#[test]
fn newest_run_wins_per_scenario() {
    let ds = parse_csv(HISTORY);
    assert_eq!(ds.rows.len(), 4);

    let view = DashboardView::build(&ds, 50);
    assert_eq!(view.scenario_count, 2);
    assert_eq!(view.row_count, 4);

    let a = &view.tiles[0];
    assert_eq!(a.scenario, "A");
    assert_eq!(a.run, "2");
    assert_eq!(a.bucket, Bucket::Good);
    assert_eq!(a.recoverability, "0.8000");
    assert_eq!(a.sha, "bbbbbbb");

    let b = &view.tiles[1];
    assert_eq!(b.label, Label::Bad);
    assert_eq!(b.basis, Basis::GvState);
}

#[test]
fn latest_selection_ignores_input_order() {
    let ds = parse_csv(HISTORY);
    let mut reversed = ds.rows.clone();
    reversed.reverse();

    let forward: Vec<(String, String)> = latest_per_scenario(&ds.rows)
        .iter()
        .map(|e| (e.scenario.to_string(), field(e.row, "run_number").to_string()))
        .collect();
    let backward: Vec<(String, String)> = latest_per_scenario(&reversed)
        .iter()
        .map(|e| (e.scenario.to_string(), field(e.row, "run_number").to_string()))
        .collect();
    assert_eq!(forward, backward);
    assert_eq!(forward, vec![("A".into(), "2".into()), ("B".into(), "2".into())]);
}

#[test]
fn tail_table_is_newest_first_and_capped() {
    let ds = parse_csv(HISTORY);
    let view = DashboardView::build(&ds, 2);
    assert_eq!(view.tail.rows.len(), 2);
    let created = view
        .tail
        .columns
        .iter()
        .position(|c| c == "run_created_utc")
        .unwrap();
    for row in &view.tail.rows {
        assert_eq!(row.cells[created], "2025-01-02T00:00:00Z");
    }

    let ordered = newest_first(&ds.rows);
    assert_eq!(field(ordered[3], "run_number"), "1");
}

#[test]
fn serialized_history_parses_back_identically() {
    let text = "scenario,note\n\"a, b\",\"said \"\"hi\"\"\"\nc,\"two\nlines\"\n";
    let ds = parse_csv(text);
    let again = parse_csv(&write_csv(&ds.headers, &ds.rows));
    assert_eq!(ds, again);
    assert_eq!(field(&ds.rows[0], "note"), "said \"hi\"");
}

#[test]
fn classifier_tolerates_missing_and_garbage_fields() {
    let ds = parse_csv("scenario,final_recoverability\nx,not-a-number\ny,\nz,0.35\n");
    let buckets: Vec<Bucket> = ds.rows.iter().map(|r| classify_row(r).bucket).collect();
    assert_eq!(buckets, vec![Bucket::Good, Bucket::Good, Bucket::Warn]);

    let view = DashboardView::build(&ds, 50);
    assert_eq!(view.tiles[0].recoverability, "not-a-number");
    assert_eq!(view.tiles[1].recoverability, "");
}

#[test]
fn static_page_escapes_and_omits_controls() {
    let snap = build_snapshot(
        "hist.csv".to_string(),
        "scenario,interlock_reason\n<script>,a&b\n",
        50,
    )
    .unwrap();
    let meta = PageMeta {
        status: "ok",
        status_kind: "ok",
        source: Some(&snap.source),
        content_sha: Some(&snap.content_sha256),
        loaded_at: Some(&snap.loaded_at),
        auto_refresh: true,
        refresh_secs: 60,
        controls: false,
    };
    let html = render_page(Some(&snap.view), &meta);
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("a&amp;b"));
    assert!(!html.contains("action=\"/refresh\""));
    assert!(!html.contains("http-equiv=\"refresh\""));
}

#[test]
fn byte_order_mark_does_not_hide_scenario_column() {
    let snap = build_snapshot(
        "f.csv".to_string(),
        "\u{feff}scenario,final_recoverability\nA,0.2\nB,0.9\n",
        50,
    )
    .unwrap();
    let names: Vec<&str> = snap.view.tiles.iter().map(|t| t.scenario.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(snap.view.latest.columns, vec!["scenario", "final_recoverability"]);
}
