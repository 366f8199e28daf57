//! Wire-shape helpers: content truncation, relative-time labels and
//! timestamp formatting.

use chrono::{DateTime, Utc};

/// Listing previews carry at most this many characters of content.
pub const SUMMARY_LIMIT: usize = 200;

/// Truncates by character count, not bytes, so multi-byte text never gets
/// split mid-codepoint. The marker is only appended when something was
/// actually cut.
pub fn summarize_content(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(SUMMARY_LIMIT).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Human-relative label with fixed thresholds; anything older than 30 days
/// renders as an absolute date. `now` is injected so callers own the clock.
pub fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - created_at).num_seconds();
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3_600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86_400 {
        format!("{} hours ago", secs / 3_600)
    } else if secs < 2_592_000 {
        format!("{} days ago", secs / 86_400)
    } else {
        created_at.format("%Y-%m-%d").to_string()
    }
}

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn short_content_is_untouched() {
        let content = "x".repeat(150);
        assert_eq!(summarize_content(&content), content);
    }

    #[test]
    fn exactly_at_the_limit_gets_no_marker() {
        let content = "y".repeat(200);
        assert_eq!(summarize_content(&content), content);
    }

    #[test]
    fn long_content_is_cut_to_200_chars_plus_marker() {
        let content = "z".repeat(250);
        let summary = summarize_content(&content);
        assert_eq!(summary.chars().count(), 203);
        assert!(summary.ends_with("..."));
        assert!(summary.starts_with(&"z".repeat(200)));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let content = "아".repeat(250);
        let summary = summarize_content(&content);
        assert_eq!(summary.chars().count(), 203);
        assert!(summary.starts_with(&"아".repeat(200)));
    }

    #[test]
    fn relative_time_thresholds() {
        let now = base();
        assert_eq!(relative_time(now - Duration::seconds(5), now), "just now");
        assert_eq!(relative_time(now - Duration::seconds(59), now), "just now");
        assert_eq!(relative_time(now - Duration::seconds(60), now), "1 minutes ago");
        assert_eq!(relative_time(now - Duration::minutes(59), now), "59 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(1), now), "1 hours ago");
        assert_eq!(relative_time(now - Duration::hours(23), now), "23 hours ago");
        assert_eq!(relative_time(now - Duration::days(1), now), "1 days ago");
        assert_eq!(relative_time(now - Duration::days(29), now), "29 days ago");
    }

    #[test]
    fn old_entries_fall_back_to_an_absolute_date() {
        let now = base();
        let created = now - Duration::days(31);
        assert_eq!(relative_time(created, now), "2024-03-31");
    }

    #[test]
    fn wire_timestamps_are_second_resolution() {
        assert_eq!(format_timestamp(base()), "2024-05-01 12:00:00");
    }
}
