//! Markdown rendering for `show pipelines`

use crate::scheduler::ScheduleInfo;

const HEADERS: [&str; 3] = ["Pipeline Name", "Trigger Type", "Schedule Parameters"];

/// Renders one row per schedule, and an empty row for unscheduled pipelines
///
/// `schedules` may list schedules of any pipeline; only those belonging to
/// `pipelines` are shown.
pub fn pipelines_table(pipelines: &[String], schedules: &[ScheduleInfo]) -> String {
    if pipelines.is_empty() {
        return "No pipelines available.".to_string();
    }

    let mut rows: Vec<[String; 3]> = Vec::new();
    for name in pipelines {
        let mut scheduled = schedules.iter().filter(|s| &s.pipeline == name).peekable();
        if scheduled.peek().is_none() {
            rows.push([name.clone(), String::new(), String::new()]);
            continue;
        }
        for schedule in scheduled {
            rows.push([
                name.clone(),
                schedule.trigger_type.to_string(),
                schedule.parameters(),
            ]);
        }
    }

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render_row(&HEADERS.map(String::from), &widths));
    lines.push(format!(
        "|{}|",
        widths
            .iter()
            .map(|w| format!(":{}", "-".repeat(w + 1)))
            .collect::<Vec<_>>()
            .join("|")
    ));
    for row in &rows {
        lines.push(render_row(row, &widths));
    }
    lines.join("\n")
}

fn render_row(cells: &[String; 3], widths: &[usize; 3]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!(" {:<width$} ", cell, width = width))
        .collect();
    format!("|{}|", padded.join("|"))
}
