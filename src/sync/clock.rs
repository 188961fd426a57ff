use chrono::{DateTime, Utc};

/// Whole seconds from `origin` to `now`, never negative
pub fn elapsed_secs(origin: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - origin).num_seconds().max(0) as u64
}

/// `HH:MM:SS`; hours keep growing past 99
pub fn format_elapsed(secs: u64) -> String {
    let hrs = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hrs, mins, secs)
}
