//! Durable timer state and the flat read model handed to observers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant of [`Phase`], used in status reports and event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Inactive,
    Running,
    Foreground,
    Paused,
    Debt,
}

/// The five mutually exclusive timer states.
///
/// Each variant carries only the counter that is meaningful in that state:
/// a positive balance cannot coexist with outstanding debt because no variant
/// has room for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    /// Timer stopped. A balance may accumulate here from grants received
    /// while idle.
    Inactive { remaining_secs: u64 },
    /// Consuming budget with the host app backgrounded.
    Running { remaining_secs: u64 },
    /// Consuming budget with the host app in foreground focus.
    Foreground { remaining_secs: u64 },
    /// Frozen by the user; ticks do not advance any counter.
    Paused { remaining_secs: u64 },
    /// Budget exhausted; usage now accrues debt until a grant repays it.
    Debt { debt_secs: u64 },
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Inactive { .. } => PhaseKind::Inactive,
            Phase::Running { .. } => PhaseKind::Running,
            Phase::Foreground { .. } => PhaseKind::Foreground,
            Phase::Paused { .. } => PhaseKind::Paused,
            Phase::Debt { .. } => PhaseKind::Debt,
        }
    }

    /// Earned-but-unused seconds. Zero while in debt.
    pub fn remaining_secs(&self) -> u64 {
        match *self {
            Phase::Inactive { remaining_secs }
            | Phase::Running { remaining_secs }
            | Phase::Foreground { remaining_secs }
            | Phase::Paused { remaining_secs } => remaining_secs,
            Phase::Debt { .. } => 0,
        }
    }

    /// Seconds consumed beyond the budget. Zero outside debt.
    pub fn debt_secs(&self) -> u64 {
        match *self {
            Phase::Debt { debt_secs } => debt_secs,
            _ => 0,
        }
    }

    /// Whether wall-clock elapsed time is charged in this state.
    pub fn is_ticking(&self) -> bool {
        matches!(
            self,
            Phase::Running { .. } | Phase::Foreground { .. } | Phase::Debt { .. }
        )
    }
}

/// Durable state of the budget engine at a point in time.
///
/// Persisted as JSON in the kv store; `last_tick_at` lets a restarted
/// process replay the gap since the last applied tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub phase: Phase,
    /// Seconds of usage consumed since the start of `day`.
    pub today_secs: u64,
    /// Seconds of usage consumed since the last week boundary.
    pub week_secs: u64,
    /// Calendar day the daily counters belong to.
    pub day: NaiveDate,
    /// Timestamp of the last applied tick; `None` while paused or inactive.
    #[serde(default)]
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl TimerSnapshot {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            phase: Phase::Inactive { remaining_secs: 0 },
            today_secs: 0,
            week_secs: 0,
            day,
            last_tick_at: None,
        }
    }
}

/// Flat view of the timer handed to callers and carried by state-change
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStatus {
    pub state: PhaseKind,
    pub remaining_secs: u64,
    pub debt_secs: u64,
    pub is_in_debt_mode: bool,
    pub is_paused: bool,
    pub today_secs: u64,
    pub week_secs: u64,
}

impl From<&TimerSnapshot> for TimerStatus {
    fn from(snap: &TimerSnapshot) -> Self {
        Self {
            state: snap.phase.kind(),
            remaining_secs: snap.phase.remaining_secs(),
            debt_secs: snap.phase.debt_secs(),
            is_in_debt_mode: snap.phase.kind() == PhaseKind::Debt,
            is_paused: snap.phase.kind() == PhaseKind::Paused,
            today_secs: snap.today_secs,
            week_secs: snap.week_secs,
        }
    }
}
