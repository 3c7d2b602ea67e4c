//! Status classification and display mapping
//!
//! One fixed terminal table is shared by serverless and runtime jobs; the
//! display mapping aligns serverless status vocabulary with the runtime job
//! API so both levels of the tree read the same.

/// Statuses after which no further state change is expected.
const TERMINAL_STATUSES: &[&str] = &[
    "DONE",
    "SUCCEEDED",
    "ERROR",
    "FAILED",
    "CANCELED",
    "CANCELLED",
    "STOPPED",
];

/// Whether a status string is terminal (case-insensitive).
///
/// An empty string or the `(unknown)` sentinel is non-terminal: a job with no
/// observed status may still change.
pub fn is_terminal(status: &str) -> bool {
    let normalized = status.trim().to_uppercase();
    TERMINAL_STATUSES.contains(&normalized.as_str())
}

/// Semantic color groups for job statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Yellow,
    Green,
    Red,
    Magenta,
    Cyan,
    Blue,
    Dim,
}

/// Resolve a status string to its semantic color group.
pub fn status_color(status: &str) -> StatusColor {
    let normalized = status.trim().to_uppercase();
    if normalized.starts_with("RUNNING") {
        return StatusColor::Yellow;
    }
    match normalized.as_str() {
        "DONE" | "SUCCEEDED" => StatusColor::Green,
        "ERROR" | "FAILED" => StatusColor::Red,
        "CANCELED" | "CANCELLED" | "STOPPED" => StatusColor::Magenta,
        "QUEUED" => StatusColor::Cyan,
        "INITIALIZING" | "PENDING" => StatusColor::Blue,
        _ => StatusColor::Dim,
    }
}

/// Map a serverless status to the display status aligned with the runtime
/// job API.
///
/// While a job is `RUNNING` with a sub-status, the sub-status is displayed
/// instead; the result is then normalized through the fixed vocabulary table.
pub fn map_display_status(status: &str, sub_status: Option<&str>) -> String {
    let sub = sub_status.map(str::trim).filter(|s| !s.is_empty());
    let display = match sub {
        Some(sub) if status.trim().eq_ignore_ascii_case("RUNNING") => sub,
        _ => status.trim(),
    };
    match display.to_uppercase().as_str() {
        "PENDING" => "INITIALIZING".to_string(),
        "STOPPED" => "CANCELED".to_string(),
        "SUCCEEDED" => "DONE".to_string(),
        "FAILED" => "ERROR".to_string(),
        _ => display.to_string(),
    }
}

/// Merge status and sub-status into a single display string.
pub fn combined_status(status: &str, sub_status: Option<&str>) -> String {
    let base = match status.trim() {
        "" => "(unknown)",
        trimmed => trimmed,
    };
    match sub_status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(detail) => format!("{base} / {detail}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        for status in ["DONE", "succeeded", "Error", "FAILED", "canceled", "CANCELLED", "stopped"] {
            assert!(is_terminal(status), "{status} should be terminal");
        }
    }

    #[test]
    fn test_non_terminal_statuses() {
        for status in ["RUNNING", "QUEUED", "INITIALIZING", "", "(unknown)", "UNAVAILABLE: timeout"] {
            assert!(!is_terminal(status), "{status} should not be terminal");
        }
    }

    #[test]
    fn test_status_color_groups() {
        assert_eq!(status_color("RUNNING"), StatusColor::Yellow);
        assert_eq!(status_color("RUNNING: MAPPING"), StatusColor::Yellow);
        assert_eq!(status_color("DONE"), StatusColor::Green);
        assert_eq!(status_color("failed"), StatusColor::Red);
        assert_eq!(status_color("STOPPED"), StatusColor::Magenta);
        assert_eq!(status_color("QUEUED"), StatusColor::Cyan);
        assert_eq!(status_color("PENDING"), StatusColor::Blue);
        assert_eq!(status_color("whatever"), StatusColor::Dim);
    }

    #[test]
    fn test_map_display_status_uses_sub_status_while_running() {
        assert_eq!(map_display_status("RUNNING", Some("MAPPING")), "MAPPING");
        assert_eq!(map_display_status("QUEUED", Some("MAPPING")), "QUEUED");
        assert_eq!(map_display_status("RUNNING", Some("  ")), "RUNNING");
    }

    #[test]
    fn test_map_display_status_vocabulary() {
        assert_eq!(map_display_status("PENDING", None), "INITIALIZING");
        assert_eq!(map_display_status("STOPPED", None), "CANCELED");
        assert_eq!(map_display_status("SUCCEEDED", None), "DONE");
        assert_eq!(map_display_status("FAILED", None), "ERROR");
        assert_eq!(map_display_status("RUNNING", None), "RUNNING");
        assert_eq!(map_display_status("Custom", None), "Custom");
    }

    #[test]
    fn test_combined_status() {
        assert_eq!(combined_status("RUNNING", Some("MAPPING")), "RUNNING / MAPPING");
        assert_eq!(combined_status("DONE", None), "DONE");
        assert_eq!(combined_status("", None), "(unknown)");
        assert_eq!(combined_status("DONE", Some("")), "DONE");
    }
}
