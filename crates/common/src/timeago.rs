//! Human-readable relative-age strings for notification payloads.
//!
//! Computed at serialization time, never stored.

use chrono::{DateTime, Utc};

/// Render the age of `created_at` relative to `now` ("Just now",
/// "5 minutes ago", "2 weeks ago", ...).
pub fn time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(created_at);
    let total_secs = diff.num_seconds().max(0);

    let days = total_secs / 86_400;
    if days > 0 {
        if days == 1 {
            return "1 day ago".to_string();
        }
        if days < 7 {
            return format!("{} days ago", days);
        }
        if days < 30 {
            let weeks = days / 7;
            return format!("{} week{} ago", weeks, if weeks > 1 { "s" } else { "" });
        }
        let months = days / 30;
        return format!("{} month{} ago", months, if months > 1 { "s" } else { "" });
    }

    let hours = (total_secs % 86_400) / 3600;
    if hours > 0 {
        return format!("{} hour{} ago", hours, if hours > 1 { "s" } else { "" });
    }

    let minutes = (total_secs % 3600) / 60;
    if minutes > 0 {
        return format!("{} minute{} ago", minutes, if minutes > 1 { "s" } else { "" });
    }

    "Just now".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(offset: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - offset, now)
    }

    #[test]
    fn test_just_now() {
        let (created, now) = at(Duration::seconds(30));
        assert_eq!(time_ago(created, now), "Just now");
    }

    #[test]
    fn test_minutes() {
        let (created, now) = at(Duration::minutes(1));
        assert_eq!(time_ago(created, now), "1 minute ago");
        let (created, now) = at(Duration::minutes(45));
        assert_eq!(time_ago(created, now), "45 minutes ago");
    }

    #[test]
    fn test_hours() {
        let (created, now) = at(Duration::hours(1));
        assert_eq!(time_ago(created, now), "1 hour ago");
        let (created, now) = at(Duration::hours(23));
        assert_eq!(time_ago(created, now), "23 hours ago");
    }

    #[test]
    fn test_days_and_weeks() {
        let (created, now) = at(Duration::days(1));
        assert_eq!(time_ago(created, now), "1 day ago");
        let (created, now) = at(Duration::days(6));
        assert_eq!(time_ago(created, now), "6 days ago");
        let (created, now) = at(Duration::days(7));
        assert_eq!(time_ago(created, now), "1 week ago");
        let (created, now) = at(Duration::days(20));
        assert_eq!(time_ago(created, now), "2 weeks ago");
    }

    #[test]
    fn test_months() {
        let (created, now) = at(Duration::days(30));
        assert_eq!(time_ago(created, now), "1 month ago");
        let (created, now) = at(Duration::days(95));
        assert_eq!(time_ago(created, now), "3 months ago");
    }

    #[test]
    fn test_future_timestamp_clamps() {
        let now = Utc::now();
        assert_eq!(time_ago(now + Duration::minutes(5), now), "Just now");
    }
}
