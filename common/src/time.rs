//! Time helpers for ledger timestamps.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp, truncated to microseconds.
///
/// Postgres `TIMESTAMPTZ` keeps microsecond precision, so every store sees the
/// same value that the engine wrote.
pub fn now() -> Timestamp {
    let ts = Utc::now();
    ts.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(ts)
}
