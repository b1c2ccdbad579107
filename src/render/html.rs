//! Self-contained HTML page (inline CSS, no scripts).
//!
//! Every value that came from the CSV passes through `html_escape`.

use super::{DashboardView, Table, Tile};

/// Page chrome that does not come from the dataset.
#[derive(Debug, Clone, Default)]
pub struct PageMeta<'a> {
    pub status: &'a str,
    /// CSS class for the status line: ok, empty, error, idle.
    pub status_kind: &'a str,
    pub source: Option<&'a str>,
    pub content_sha: Option<&'a str>,
    pub loaded_at: Option<&'a str>,
    pub auto_refresh: bool,
    pub refresh_secs: u64,
    /// Render the refresh button and auto toggle (server mode only).
    pub controls: bool,
}

pub fn render_page(view: Option<&DashboardView>, meta: &PageMeta<'_>) -> String {
    let meta_refresh = if meta.controls && meta.auto_refresh && meta.refresh_secs > 0 {
        format!(r#"<meta http-equiv="refresh" content="{}">"#, meta.refresh_secs)
    } else {
        String::new()
    };
    let body = match view {
        Some(view) => format!(
            "{tiles}\n<h2>Latest per scenario</h2>\n{latest}\n<h2>Most recent {n} runs</h2>\n{tail}",
            tiles = render_tiles(&view.tiles),
            latest = render_table(&view.latest),
            n = view.tail.rows.len(),
            tail = render_table(&view.tail),
        ),
        None => r#"<p class="empty">No data rendered yet.</p>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    {meta_refresh}
    <title>GV run monitor</title>
    <style>{css}</style>
</head>
<body>
    <div class="container">
        <header>
            <h1>GV run monitor</h1>
            {controls}
        </header>
        <div class="status {kind}">{status}</div>
        <div class="meta">{meta_line}</div>
        {body}
    </div>
</body>
</html>
"#,
        meta_refresh = meta_refresh,
        css = inline_css(),
        controls = render_controls(meta),
        kind = html_escape(meta.status_kind),
        status = html_escape(meta.status),
        meta_line = meta_line(view, meta),
        body = body,
    )
}

fn render_controls(meta: &PageMeta<'_>) -> String {
    if !meta.controls {
        return String::new();
    }
    let toggle = if meta.auto_refresh {
        format!("Auto-refresh: on ({}s)", meta.refresh_secs)
    } else {
        "Auto-refresh: off".to_string()
    };
    format!(
        r#"<div class="controls">
                <form method="post" action="/refresh"><button type="submit">Refresh now</button></form>
                <form method="post" action="/auto"><button type="submit" class="toggle">{}</button></form>
            </div>"#,
        toggle
    )
}

fn meta_line(view: Option<&DashboardView>, meta: &PageMeta<'_>) -> String {
    let mut parts = Vec::new();
    if let Some(view) = view {
        parts.push(format!("{} rows", view.row_count));
        parts.push(format!("{} scenarios", view.scenario_count));
    }
    if let Some(source) = meta.source {
        parts.push(format!("source {}", html_escape(source)));
    }
    if let Some(sha) = meta.content_sha {
        let prefix: String = sha.chars().take(12).collect();
        parts.push(format!("sha256 {}", html_escape(&prefix)));
    }
    if let Some(at) = meta.loaded_at {
        parts.push(format!("loaded {}", html_escape(at)));
    }
    parts.join(" · ")
}

fn render_tiles(tiles: &[Tile]) -> String {
    if tiles.is_empty() {
        return r#"<p class="empty">No scenarios.</p>"#.to_string();
    }
    let mut html = String::from(r#"<div class="tiles">"#);
    for tile in tiles {
        html.push_str(&render_tile(tile));
    }
    html.push_str("</div>");
    html
}

fn render_tile(tile: &Tile) -> String {
    let mut notes = String::new();
    let mut note = |name: &str, value: &Option<String>| {
        if let Some(v) = value {
            notes.push_str(&format!(
                r#"<div class="kv"><span>{}</span><span class="mono">{}</span></div>"#,
                name,
                html_escape(v)
            ));
        }
    };
    note("safety action", &tile.safety_action);
    note("interlock", &tile.interlock_reason);
    note("goodness", &tile.goodness_ratio);

    format!(
        r#"<div class="tile {bucket}">
    <div class="tile-head"><span class="name">{scenario}</span><span class="pill {bucket}">{label}</span></div>
    <div class="kv"><span>R</span><span class="mono">{r}</span></div>
    <div class="kv"><span>cum |dGV|</span><span class="mono">{d}</span></div>
    <div class="kv"><span>peak |dS/dt|</span><span class="mono">{p}</span></div>
    {notes}
    <div class="kv"><span>behavior</span><span class="mono">{behavior}</span></div>
    <div class="foot mono">run {run} · {sha} · {created}</div>
</div>"#,
        bucket = tile.bucket.as_str(),
        scenario = html_escape(&tile.scenario),
        label = tile.label.as_str(),
        r = html_escape(&tile.recoverability),
        d = html_escape(&tile.cum_deviation),
        p = html_escape(&tile.peak_rate),
        notes = notes,
        behavior = html_escape(&tile.behavior),
        run = html_escape(&tile.run),
        sha = html_escape(&tile.sha),
        created = html_escape(&tile.created),
    )
}

fn render_table(table: &Table) -> String {
    let mut html = String::from(r#"<div class="table-wrap"><table><thead><tr>"#);
    for col in &table.columns {
        html.push_str(&format!("<th>{}</th>", html_escape(col)));
    }
    html.push_str("</tr></thead><tbody>");
    for row in &table.rows {
        html.push_str(&format!(r#"<tr class="{}">"#, row.bucket.as_str()));
        for cell in &row.cells {
            html.push_str(&format!(r#"<td class="mono">{}</td>"#, html_escape(cell)));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table></div>");
    html
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn inline_css() -> &'static str {
    r#"
:root { --bg:#0d1117; --fg:#e6edf3; --muted:#8b949e; --border:#30363d;
        --good:#3fb950; --warn:#d29922; --bad:#f85149; --panel:#161b22; }
body { background:var(--bg); color:var(--fg); font-family:-apple-system,Segoe UI,Helvetica,Arial,sans-serif; margin:0; }
.container { max-width:1280px; margin:0 auto; padding:1.5rem; }
header { display:flex; justify-content:space-between; align-items:center; }
h1 { font-size:1.4rem; margin:0; }
h2 { font-size:1.05rem; margin:1.5rem 0 0.5rem; color:var(--muted); }
.controls { display:flex; gap:0.5rem; }
.controls form { margin:0; }
button { background:var(--panel); color:var(--fg); border:1px solid var(--border); border-radius:6px; padding:0.35rem 0.8rem; cursor:pointer; }
.status { margin-top:0.75rem; font-size:0.9rem; }
.status.ok { color:var(--good); } .status.empty { color:var(--warn); } .status.error { color:var(--bad); } .status.idle { color:var(--muted); }
.meta { color:var(--muted); font-size:0.8rem; margin-top:0.25rem; }
.tiles { display:grid; grid-template-columns:repeat(auto-fill,minmax(260px,1fr)); gap:0.75rem; margin-top:1rem; }
.tile { background:var(--panel); border:1px solid var(--border); border-left:4px solid var(--border); border-radius:8px; padding:0.75rem; }
.tile.good { border-left-color:var(--good); } .tile.warn { border-left-color:var(--warn); } .tile.bad { border-left-color:var(--bad); }
.tile-head { display:flex; justify-content:space-between; margin-bottom:0.5rem; }
.name { font-weight:600; }
.pill { border-radius:999px; padding:0 0.6rem; font-size:0.75rem; font-weight:700; color:#0d1117; }
.pill.good { background:var(--good); } .pill.warn { background:var(--warn); } .pill.bad { background:var(--bad); }
.kv { display:flex; justify-content:space-between; font-size:0.85rem; color:var(--muted); }
.kv .mono { color:var(--fg); }
.foot { margin-top:0.5rem; font-size:0.75rem; color:var(--muted); }
.mono { font-family:ui-monospace,SFMono-Regular,Menlo,monospace; }
.table-wrap { overflow-x:auto; border:1px solid var(--border); border-radius:8px; }
table { border-collapse:collapse; width:100%; font-size:0.8rem; }
th, td { padding:0.3rem 0.6rem; border-bottom:1px solid var(--border); text-align:left; white-space:nowrap; }
th { background:var(--panel); color:var(--muted); }
tr.warn td:first-child { box-shadow:inset 3px 0 var(--warn); }
tr.bad td:first-child { box-shadow:inset 3px 0 var(--bad); }
.empty { color:var(--muted); }
"#
}
