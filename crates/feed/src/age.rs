use chrono::Utc;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Source of the shared "now" sample.
pub trait Clock: Send + Sync {
    /// Current unix time in seconds
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Seconds elapsed between `timestamp` and `now`, clamped at zero.
pub fn age_seconds(now: i64, timestamp: i64) -> u64 {
    now.saturating_sub(timestamp).max(0) as u64
}

pub fn format_age(seconds: u64) -> String {
    let (value, unit) = if seconds >= DAY {
        (seconds / DAY, "day")
    } else if seconds >= HOUR {
        (seconds / HOUR, "hour")
    } else if seconds >= MINUTE {
        (seconds / MINUTE, "minute")
    } else {
        (seconds, "second")
    };
    let plural = if value == 1 { "" } else { "s" };
    format!("{} {}{} ago", value, unit, plural)
}
