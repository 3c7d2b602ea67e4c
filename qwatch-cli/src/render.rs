//! Static tree rendering with a hard line budget
//!
//! Used by plain watch mode: the whole tree is re-rendered as text each
//! refresh, but never emits more lines than the terminal can show. Parents
//! are rendered newest first until the budget runs out; a parent's children
//! fill whatever budget remains, with a single "N more" indicator replacing
//! the rest.

use colored::Colorize;

use qwatch_core::domain::job::{JobRow, UNKNOWN_BACKEND};
use qwatch_core::status::{StatusColor, combined_status, is_terminal, status_color};
use qwatch_core::timefmt::relative_created;

/// Clamp text to a fixed cell width.
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }
    let kept: String = value.chars().take(width.saturating_sub(3).max(1)).collect();
    format!("{kept}...")
}

fn paint(text: &str, color: StatusColor) -> String {
    match color {
        StatusColor::Yellow => text.yellow(),
        StatusColor::Green => text.green(),
        StatusColor::Red => text.red(),
        StatusColor::Magenta => text.magenta(),
        StatusColor::Cyan => text.cyan(),
        StatusColor::Blue => text.blue(),
        StatusColor::Dim => text.bright_black(),
    }
    .to_string()
}

fn field_or_unknown(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => "(unknown)",
    }
}

fn job_line(row: &JobRow, spinner: &str) -> String {
    let merged = combined_status(&row.status, row.sub_status.as_deref());
    let status_text = truncate(&merged, 32);
    let mut line = format!(
        "├─ {} {} {} {}",
        truncate(field_or_unknown(row.function.as_deref()), 24),
        row.job_id.bright_white(),
        paint(&status_text, status_color(&row.status)),
        relative_created(row.created.as_ref()).bright_black(),
    );
    if !is_terminal(&row.status) {
        line.push(' ');
        line.push_str(&spinner.bright_black().to_string());
    }
    line
}

fn runtime_line(runtime: &qwatch_core::domain::job::RuntimeJobView, spinner: &str) -> String {
    let status = runtime.status.trim();
    if status.is_empty() {
        return format!(
            "│  ├─ {} {}",
            runtime.runtime_job_id.bright_white(),
            spinner.bright_black()
        );
    }
    let spinning = !is_terminal(status);
    let backend = runtime.backend.trim();
    let backend_display = if spinning && (backend.is_empty() || backend == UNKNOWN_BACKEND) {
        UNKNOWN_BACKEND
    } else {
        field_or_unknown(Some(backend))
    };
    let mut line = format!(
        "│  ├─ {} {} {}",
        runtime.runtime_job_id.bright_white(),
        paint(status, status_color(status)),
        backend_display.bright_black(),
    );
    if spinning {
        line.push(' ');
        line.push_str(&spinner.bright_black().to_string());
    }
    line
}

/// Render the jobs tree as at most `line_budget` text lines.
///
/// Rows are ordered newest first and truncated to `limit` before rendering.
pub fn render_tree_lines(
    rows: &[JobRow],
    limit: usize,
    line_budget: usize,
    spinner: &str,
) -> Vec<String> {
    if rows.is_empty() {
        return vec!["(no jobs)".bright_black().to_string()];
    }

    let mut rows_sorted: Vec<&JobRow> = rows.iter().collect();
    rows_sorted.sort_by(|a, b| b.created.cmp(&a.created));
    rows_sorted.truncate(limit.max(1));

    let line_budget = line_budget.max(3);
    let mut lines = vec!["Serverless jobs".bold().to_string()];
    let mut used = 1;

    for row in rows_sorted {
        if used + 1 > line_budget {
            break;
        }
        lines.push(job_line(row, spinner));
        used += 1;

        let remaining = line_budget.saturating_sub(used);
        let total = row.runtime_jobs.len();
        if total <= remaining {
            for runtime in &row.runtime_jobs {
                lines.push(runtime_line(runtime, spinner));
            }
            used += total;
            continue;
        }

        // Not all children fit: the last remaining line becomes the
        // indicator, and the render terminates rather than exceed the budget.
        if remaining == 0 {
            break;
        }
        let shown = remaining - 1;
        for runtime in &row.runtime_jobs[..shown] {
            lines.push(runtime_line(runtime, spinner));
        }
        let hidden = total - shown;
        lines.push(
            format!("│  └─ ... {hidden} more runtime jobs")
                .bright_black()
                .to_string(),
        );
        break;
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qwatch_core::domain::job::RuntimeJobView;

    fn row(job_id: &str, created_secs: i64, runtime_count: usize) -> JobRow {
        JobRow {
            job_id: job_id.to_string(),
            status: "RUNNING".to_string(),
            sub_status: None,
            created: Some(chrono::Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap()),
            function: Some("acme/sampler".to_string()),
            runtime_jobs: (0..runtime_count)
                .map(|i| RuntimeJobView {
                    runtime_job_id: format!("{job_id}-r{i}"),
                    status: "RUNNING".to_string(),
                    backend: "backend_a".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_line_budget_is_never_exceeded() {
        let rows = vec![row("j1", 2, 3), row("j2", 1, 3), row("j3", 0, 3)];
        let lines = render_tree_lines(&rows, 50, 5, "⠋");

        // Root + first job + its three children; remaining jobs dropped.
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("j1"));
        assert!(lines[4].contains("j1-r2"));
    }

    #[test]
    fn test_truncated_children_render_more_indicator() {
        let rows = vec![row("j1", 0, 8)];
        let lines = render_tree_lines(&rows, 50, 6, "⠋");

        assert_eq!(lines.len(), 6);
        assert!(lines[5].contains("5 more runtime jobs"));
    }

    #[test]
    fn test_no_indicator_when_budget_is_exactly_full() {
        let rows = vec![row("j1", 0, 4)];
        let lines = render_tree_lines(&rows, 50, 6, "⠋");

        // Root + job + four children exactly fill the budget.
        assert_eq!(lines.len(), 6);
        assert!(!lines[5].contains("more runtime jobs"));
    }

    #[test]
    fn test_empty_rows_render_placeholder() {
        let lines = render_tree_lines(&[], 50, 10, "⠋");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("(no jobs)"));
    }

    #[test]
    fn test_limit_caps_rendered_jobs() {
        let rows = vec![row("j1", 2, 0), row("j2", 1, 0), row("j3", 0, 0)];
        let lines = render_tree_lines(&rows, 2, 20, "⠋");

        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("j1"));
        assert!(lines[2].contains("j2"));
    }

    #[test]
    fn test_truncate_clamps_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-much-longer-value", 10), "a-much-...");
        assert_eq!(truncate("abcdef", 3), "abc");
    }
}
