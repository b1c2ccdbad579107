//! Terminal rendition for `gvwatch status`.

use colored::Colorize;

use super::{DashboardView, Table, Tile};
use crate::classify::Bucket;

pub fn render_summary(view: &DashboardView, source: &str) -> String {
    let mut out = format!(
        "{} rows, {} scenarios from {}\n\n",
        view.row_count, view.scenario_count, source
    );
    for tile in &view.tiles {
        out.push_str(&tile_line(tile));
        out.push('\n');
    }
    out
}

fn pill(bucket: Bucket, label: &str) -> String {
    let text = format!("{:<4}", label);
    match bucket {
        Bucket::Good => text.green().bold().to_string(),
        Bucket::Warn => text.yellow().bold().to_string(),
        Bucket::Bad => text.red().bold().to_string(),
    }
}

fn tile_line(tile: &Tile) -> String {
    let mut line = format!(
        "[{}] {:<28} R={:<8} D={:<8} P={:<10} {}",
        pill(tile.bucket, tile.label.as_str()),
        tile.scenario,
        tile.recoverability,
        tile.cum_deviation,
        tile.peak_rate,
        tile.behavior,
    );
    if let Some(action) = tile.safety_action.as_deref().filter(|s| !s.is_empty()) {
        line.push_str(&format!(" action={}", action));
    }
    if let Some(reason) = tile.interlock_reason.as_deref().filter(|s| !s.is_empty()) {
        line.push_str(&format!(" interlock={}", reason));
    }
    line.push_str(
        &format!("  run {} {} {}", tile.run, tile.sha, tile.created)
            .dimmed()
            .to_string(),
    );
    line
}

/// Plain aligned table; widths follow the longest cell per column.
pub fn render_table(table: &Table) -> String {
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.cells.iter().enumerate() {
            let len = cell.chars().count();
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(len);
            }
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c.replace('\n', " "), width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(table.columns.as_slice());
    out.push('\n');
    for row in &table.rows {
        out.push_str(&line(row.cells.as_slice()));
        out.push('\n');
    }
    out
}
