//! Profiler accounting for long-running validation queries.

use crate::model::QueryRef;

/// A query whose terminal runtime met the profiler threshold.
#[derive(Debug, Clone)]
pub struct ProfilerRow {
    /// The reference the query was validating.
    pub reference: QueryRef,
    /// Runtime in seconds.
    pub runtime: f64,
    pub query_id: Option<i64>,
    pub explore_url: Option<String>,
}

const HEADERS: [&str; 5] = ["Type", "Name", "Runtime (s)", "Query ID", "Explore From Here"];

/// Render profiler rows as a github-style table, slowest first.
///
/// Returns the "nothing exceeded the threshold" message when there are
/// no rows.
pub fn format_profile_table(rows: &[ProfilerRow], runtime_threshold: u64) -> String {
    if rows.is_empty() {
        return format!("All queries completed in less than {runtime_threshold} seconds.");
    }

    let mut sorted: Vec<&ProfilerRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.runtime.total_cmp(&a.runtime));

    let cells: Vec<[String; 5]> = sorted
        .iter()
        .map(|row| {
            [
                row.reference.kind().to_string(),
                row.reference.name().to_string(),
                format!("{:.1}", row.runtime),
                row.query_id.map(|id| id.to_string()).unwrap_or_default(),
                row.explore_url.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let mut widths: [usize; 5] = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(format_row(&HEADERS.map(str::to_string), &widths));
    lines.push(format!(
        "|{}|",
        widths
            .map(|width| "-".repeat(width + 2))
            .join("|")
    ));
    for row in &cells {
        lines.push(format_row(row, &widths));
    }
    lines.join("\n")
}

fn format_row(cells: &[String; 5], widths: &[usize; 5]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!(" {cell:<width$} "))
        .collect();
    format!("|{}|", padded.join("|"))
}
