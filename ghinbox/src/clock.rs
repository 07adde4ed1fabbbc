use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

/// Source of "now" for services that compute time windows.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at `at`.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

/// `days` days before `at`, or `None` when that instant is out of range.
pub fn days_before(at: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|delta| at.checked_sub_signed(delta))
}
