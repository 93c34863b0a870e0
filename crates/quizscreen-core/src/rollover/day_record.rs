//! Per-day accounting records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One calendar day's accounting, keyed by date.
///
/// Created at the first activity of a day, finalized exactly once by the
/// rollover, and retained afterwards for history. `remaining_minutes` and
/// `overtime_minutes` are mutually exclusive: a day ends either under or
/// over budget, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    /// End-of-day unused budget, in whole minutes.
    pub remaining_minutes: u64,
    /// End-of-day outstanding debt, in whole minutes.
    pub overtime_minutes: u64,
    /// Usage consumed over the day, in whole minutes.
    pub used_minutes: u64,
    /// Score the day's leftovers are worth, computed at sealing.
    pub potential_carryover_score: i64,
    /// Score actually credited or debited to the running total.
    pub applied_carryover_score: i64,
    /// Whether the day ended in surplus.
    pub is_positive: bool,
    /// Set once the rollover has settled this day; sealed records are never
    /// mutated again.
    pub sealed: bool,
    pub sealed_at: Option<DateTime<Utc>>,
}

/// Carryover summary for the most recently settled day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryoverInfo {
    pub remaining_time_minutes: u64,
    pub overtime_minutes: u64,
    pub potential_carryover_score: i64,
    pub applied_carryover_score: i64,
    pub is_positive: bool,
}

impl From<&DayRecord> for CarryoverInfo {
    fn from(record: &DayRecord) -> Self {
        Self {
            remaining_time_minutes: record.remaining_minutes,
            overtime_minutes: record.overtime_minutes,
            potential_carryover_score: record.potential_carryover_score,
            applied_carryover_score: record.applied_carryover_score,
            is_positive: record.is_positive,
        }
    }
}
