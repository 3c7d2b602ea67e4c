//! Time formatting helpers

use chrono::{DateTime, Utc};

/// Render a created timestamp as a relative age against now.
pub fn relative_created(created: Option<&DateTime<Utc>>) -> String {
    relative_created_at(created, Utc::now())
}

fn relative_created_at(created: Option<&DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created) = created else {
        return "-".to_string();
    };
    let delta = (now - *created).num_seconds().max(0);
    if delta < 60 {
        format!("{delta}s ago")
    } else if delta < 3600 {
        format!("{} min ago", delta / 60)
    } else if delta < 86_400 {
        format!("{} hours ago", delta / 3600)
    } else {
        format!("{} days ago", delta / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_relative_ages() {
        let now = at(0);
        assert_eq!(relative_created_at(Some(&at(-37)), now), "37s ago");
        assert_eq!(relative_created_at(Some(&at(-300)), now), "5 min ago");
        assert_eq!(relative_created_at(Some(&at(-3 * 3600)), now), "3 hours ago");
        assert_eq!(relative_created_at(Some(&at(-2 * 86_400)), now), "2 days ago");
    }

    #[test]
    fn test_missing_and_future_timestamps() {
        let now = at(0);
        assert_eq!(relative_created_at(None, now), "-");
        // Clock skew never yields negative ages.
        assert_eq!(relative_created_at(Some(&at(30)), now), "0s ago");
    }
}
