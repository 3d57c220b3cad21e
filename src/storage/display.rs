//! Human-readable durations, timestamps and sizes for recording lists.

use chrono::{DateTime, Local, TimeZone};

/// `MM:SS`, minutes unbounded (`3_661_000` → `"61:01"`).
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// `MM:SS.t`, or `HH:MM:SS.t` from one hour up. Tenths are truncated.
pub fn format_duration_with_tenths(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let tenths = (ms % 1000) / 100;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{tenths}")
    } else {
        format!("{minutes:02}:{seconds:02}.{tenths}")
    }
}

/// `dd.MM.yyyy HH:mm:ss` in local time for a Unix timestamp in milliseconds.
pub fn format_timestamp(epoch_ms: i64) -> String {
    format_timestamp_in(epoch_ms, &Local)
}

pub fn format_timestamp_in<Tz>(epoch_ms: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match DateTime::from_timestamp_millis(epoch_ms) {
        Some(utc) => utc.with_timezone(tz).format("%d.%m.%Y %H:%M:%S").to_string(),
        None => String::from("--.--.---- --:--:--"),
    }
}

/// `"N KB"` up to 1024 KB, `"N.NN MB"` above.
pub fn format_file_size(size_kb: u64) -> String {
    if size_kb > 1024 {
        format!("{:.2} MB", size_kb as f64 / 1024.0)
    } else {
        format!("{size_kb} KB")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn duration_minutes_and_seconds() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(500), "00:00");
        assert_eq!(format_duration(125_000), "02:05");
        assert_eq!(format_duration(3_661_000), "61:01");
    }

    #[test]
    fn duration_with_tenths() {
        assert_eq!(format_duration_with_tenths(0), "00:00.0");
        assert_eq!(format_duration_with_tenths(1_234), "00:01.2");
        assert_eq!(format_duration_with_tenths(90_500), "01:30.5");
        assert_eq!(format_duration_with_tenths(599_900), "09:59.9");
        assert_eq!(format_duration_with_tenths(5_445_600), "01:30:45.6");
        assert_eq!(format_duration_with_tenths(7_200_000), "02:00:00.0");
    }

    #[test]
    fn timestamp_in_utc() {
        assert_eq!(format_timestamp_in(1_000, &Utc), "01.01.1970 00:00:01");
        assert_eq!(
            format_timestamp_in(1_709_802_302_000, &Utc),
            "07.03.2024 09:05:02"
        );
        assert_ne!(format_timestamp(1_000), format_timestamp(2_000));
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 KB");
        assert_eq!(format_file_size(1024), "1024 KB");
        assert_eq!(format_file_size(1536), "1.50 MB");
    }
}
