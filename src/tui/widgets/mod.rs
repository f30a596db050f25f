pub mod dashboard;
pub mod notifications;
pub mod room_detail;
pub mod rooms;

use chrono::DateTime;

pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub(crate) fn format_date(date_str: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        dt.format("%b %d %H:%M").to_string()
    } else {
        date_str.chars().take(16).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("습관 만들기 모임", 6), "습관 ...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn format_date_falls_back() {
        assert_eq!(format_date("2026-11-01T20:30:00+09:00"), "Nov 01 20:30");
        assert_eq!(format_date("bogus"), "bogus");
    }
}
