//! Budget engine implementation.
//!
//! The engine is a wall-clock-based state machine. It does not use internal
//! threads or read the clock itself - every mutating entry point takes `now`
//! as an argument and the caller is responsible for calling `tick()`
//! periodically.
//!
//! ## State transitions
//!
//! ```text
//! Inactive -> Running <-> Foreground
//!                |  \
//!             Paused  Debt   (Debt entered by exhausting the budget,
//!                |    /       left by a grant repaying it)
//!             Inactive
//! ```
//!
//! A tick never applies negative elapsed time: a wall clock observed behind
//! the last tick is logged and treated as zero elapsed. A tick that would
//! run past midnight stops at the boundary and reports the crossing so the
//! owner can reconcile the finished day before ticking on.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::snapshot::{Phase, TimerSnapshot, TimerStatus};
use crate::error::BudgetError;
use crate::events::{Event, GrantSource};

/// Result of applying one tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Seconds of usage charged by this tick.
    pub consumed_secs: u64,
    /// The tick wanted to advance past the end of the snapshot's day and
    /// stopped at the boundary instead.
    pub crossed_day: bool,
    /// The wall clock was observed behind the last tick; zero elapsed time
    /// was applied and the anchor reset.
    pub anomaly: bool,
    pub events: Vec<Event>,
}

/// Core budget state machine.
///
/// Operates on wall-clock deltas -- no internal thread, no clock access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEngine {
    snap: TimerSnapshot,
}

impl BudgetEngine {
    /// Fresh engine with empty counters for the given day.
    pub fn new(day: NaiveDate) -> Self {
        Self {
            snap: TimerSnapshot::new(day),
        }
    }

    /// Rebuild from a persisted snapshot. The caller replays the gap since
    /// `last_tick_at` through `tick()` afterwards.
    pub fn from_snapshot(snap: TimerSnapshot) -> Self {
        Self { snap }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> &TimerSnapshot {
        &self.snap
    }

    pub fn status(&self) -> TimerStatus {
        TimerStatus::from(&self.snap)
    }

    pub fn day(&self) -> NaiveDate {
        self.snap.day
    }

    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        self.snap.last_tick_at
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// `Inactive`/`Paused` -> `Running`. No-op while already consuming.
    ///
    /// # Errors
    /// [`BudgetError::NoBudget`] when there is nothing to spend.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<Option<Event>, BudgetError> {
        match self.snap.phase {
            Phase::Inactive { remaining_secs } | Phase::Paused { remaining_secs } => {
                if remaining_secs == 0 {
                    return Err(BudgetError::NoBudget);
                }
                self.snap.phase = Phase::Running { remaining_secs };
                self.snap.last_tick_at = Some(now);
                Ok(Some(Event::TimerStarted {
                    remaining_secs,
                    at: now,
                }))
            }
            Phase::Running { .. } | Phase::Foreground { .. } | Phase::Debt { .. } => Ok(None),
        }
    }

    /// `Running`/`Foreground` -> `Paused`. No-op elsewhere; in particular
    /// debt cannot be frozen - usage during debt keeps counting until a
    /// grant repays it or the timer is stopped.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        match self.snap.phase {
            Phase::Running { remaining_secs } | Phase::Foreground { remaining_secs } => {
                self.snap.phase = Phase::Paused { remaining_secs };
                self.snap.last_tick_at = None;
                Some(Event::TimerPaused {
                    remaining_secs,
                    at: now,
                })
            }
            _ => None,
        }
    }

    /// Any state -> `Inactive`. Clears the balance and any outstanding debt;
    /// the consumed-usage counters survive. No-op while already inactive.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if matches!(self.snap.phase, Phase::Inactive { .. }) {
            return None;
        }
        self.snap.phase = Phase::Inactive { remaining_secs: 0 };
        self.snap.last_tick_at = None;
        Some(Event::TimerStopped { at: now })
    }

    /// Host app focus report: `Running` <-> `Foreground`. Accounting is
    /// identical in both; only the reported substate changes.
    pub fn set_foreground(&mut self, now: DateTime<Utc>, foreground: bool) -> Option<Event> {
        let next = match (self.snap.phase, foreground) {
            (Phase::Running { remaining_secs }, true) => Phase::Foreground { remaining_secs },
            (Phase::Foreground { remaining_secs }, false) => Phase::Running { remaining_secs },
            _ => return None,
        };
        self.snap.phase = next;
        Some(Event::ForegroundChanged {
            foreground,
            at: now,
        })
    }

    /// Quiz reward: whole minutes of budget.
    ///
    /// # Errors
    /// [`BudgetError::InvalidGrant`] on negative or non-finite input,
    /// rejected before any mutation.
    pub fn add_time_from_quiz(
        &mut self,
        now: DateTime<Utc>,
        minutes: f64,
    ) -> Result<Vec<Event>, BudgetError> {
        let secs = grant_secs(minutes, 60.0)?;
        Ok(self.apply_grant(now, GrantSource::Quiz, secs))
    }

    /// Goal completion reward: hours of budget.
    ///
    /// # Errors
    /// [`BudgetError::InvalidGrant`] on negative or non-finite input.
    pub fn add_time_from_goal(
        &mut self,
        now: DateTime<Utc>,
        hours: f64,
    ) -> Result<Vec<Event>, BudgetError> {
        let secs = grant_secs(hours, 3600.0)?;
        Ok(self.apply_grant(now, GrantSource::Goal, secs))
    }

    /// Grants drain debt first; any surplus becomes fresh budget and leaves
    /// debt mode. A zero-second grant is a no-op.
    fn apply_grant(&mut self, now: DateTime<Utc>, source: GrantSource, secs: u64) -> Vec<Event> {
        if secs == 0 {
            return Vec::new();
        }
        let mut events = vec![Event::GrantApplied {
            source,
            granted_secs: secs,
            at: now,
        }];
        self.snap.phase = match self.snap.phase {
            Phase::Debt { debt_secs } => {
                if secs >= debt_secs {
                    let remaining_secs = secs - debt_secs;
                    events.push(Event::DebtCleared {
                        remaining_secs,
                        at: now,
                    });
                    Phase::Running { remaining_secs }
                } else {
                    Phase::Debt {
                        debt_secs: debt_secs - secs,
                    }
                }
            }
            Phase::Inactive { remaining_secs } => Phase::Inactive {
                remaining_secs: remaining_secs.saturating_add(secs),
            },
            Phase::Running { remaining_secs } => Phase::Running {
                remaining_secs: remaining_secs.saturating_add(secs),
            },
            Phase::Foreground { remaining_secs } => Phase::Foreground {
                remaining_secs: remaining_secs.saturating_add(secs),
            },
            Phase::Paused { remaining_secs } => Phase::Paused {
                remaining_secs: remaining_secs.saturating_add(secs),
            },
        };
        events
    }

    /// Charge the wall-clock time elapsed since the last tick, stopping at
    /// the end of the snapshot's day. Call periodically while consuming.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let mut out = TickOutcome::default();
        let Some(last) = self.snap.last_tick_at else {
            return out;
        };
        if !self.snap.phase.is_ticking() {
            self.snap.last_tick_at = None;
            return out;
        }
        if now < last {
            warn!(
                last = %last,
                observed = %now,
                "wall clock moved backward; applying zero elapsed time"
            );
            self.snap.last_tick_at = Some(now);
            out.anomaly = true;
            return out;
        }

        let day_end = day_end_utc(self.snap.day);
        out.crossed_day = now >= day_end;
        let target = now.min(day_end);
        let elapsed = (target - last).num_seconds().max(0) as u64;
        if elapsed == 0 {
            return out;
        }

        self.snap.phase = match self.snap.phase {
            Phase::Running { remaining_secs } => {
                self.charge_running(remaining_secs, elapsed, target, &mut out, false)
            }
            Phase::Foreground { remaining_secs } => {
                self.charge_running(remaining_secs, elapsed, target, &mut out, true)
            }
            Phase::Debt { debt_secs } => Phase::Debt {
                debt_secs: debt_secs.saturating_add(elapsed),
            },
            other => other,
        };
        self.snap.today_secs = self.snap.today_secs.saturating_add(elapsed);
        self.snap.week_secs = self.snap.week_secs.saturating_add(elapsed);
        // Advance the anchor by whole charged seconds so sub-second
        // remainders carry into the next tick instead of being dropped.
        self.snap.last_tick_at = Some(last + Duration::seconds(elapsed as i64));
        out.consumed_secs = elapsed;
        out
    }

    fn charge_running(
        &self,
        remaining_secs: u64,
        elapsed: u64,
        at: DateTime<Utc>,
        out: &mut TickOutcome,
        foreground: bool,
    ) -> Phase {
        if elapsed > remaining_secs {
            let debt_secs = elapsed - remaining_secs;
            out.events.push(Event::DebtEntered { debt_secs, at });
            Phase::Debt { debt_secs }
        } else if foreground {
            Phase::Foreground {
                remaining_secs: remaining_secs - elapsed,
            }
        } else {
            Phase::Running {
                remaining_secs: remaining_secs - elapsed,
            }
        }
    }

    /// Close out the finished day and zero the daily counters. The balance
    /// and any debt reset with the day; leftovers only travel forward as
    /// carryover score, which the caller settles before invoking this.
    pub fn begin_day(&mut self, day: NaiveDate, week_secs: u64) {
        self.snap.phase = match self.snap.phase {
            Phase::Inactive { .. } => Phase::Inactive { remaining_secs: 0 },
            Phase::Paused { .. } => Phase::Paused { remaining_secs: 0 },
            Phase::Running { .. } | Phase::Debt { .. } => Phase::Running { remaining_secs: 0 },
            Phase::Foreground { .. } => Phase::Foreground { remaining_secs: 0 },
        };
        self.snap.today_secs = 0;
        self.snap.week_secs = week_secs;
        self.snap.day = day;
    }
}

fn grant_secs(amount: f64, unit_secs: f64) -> Result<u64, BudgetError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(BudgetError::InvalidGrant { value: amount });
    }
    Ok((amount * unit_secs).round() as u64)
}

/// First instant of the day after `day`, in UTC.
pub(crate) fn day_end_utc(day: NaiveDate) -> DateTime<Utc> {
    let next = day.succ_opt().unwrap_or(day);
    Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::PhaseKind;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn engine_with_budget(secs: u64) -> BudgetEngine {
        let mut engine = BudgetEngine::new(day());
        engine
            .add_time_from_quiz(at(8, 0, 0), secs as f64 / 60.0)
            .unwrap();
        engine
    }

    #[test]
    fn start_requires_budget() {
        let mut engine = BudgetEngine::new(day());
        assert!(matches!(
            engine.start(at(8, 0, 0)),
            Err(BudgetError::NoBudget)
        ));

        engine.add_time_from_quiz(at(8, 0, 0), 1.0).unwrap();
        assert!(engine.start(at(8, 0, 1)).unwrap().is_some());
        assert_eq!(engine.status().state, PhaseKind::Running);
    }

    #[test]
    fn start_while_running_is_a_silent_no_op() {
        let mut engine = engine_with_budget(60);
        engine.start(at(8, 0, 0)).unwrap();
        let before = engine.snapshot().clone();

        assert!(engine.start(at(8, 0, 30)).unwrap().is_none());
        assert_eq!(engine.snapshot(), &before);
    }

    #[test]
    fn stop_while_inactive_is_a_silent_no_op() {
        let mut engine = BudgetEngine::new(day());
        assert!(engine.stop(at(8, 0, 0)).is_none());
    }

    #[test]
    fn stop_clears_balance_but_keeps_usage_counters() {
        let mut engine = engine_with_budget(120);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 0, 45));
        assert!(engine.stop(at(8, 0, 45)).is_some());

        let snap = engine.snapshot();
        assert_eq!(snap.phase, Phase::Inactive { remaining_secs: 0 });
        assert_eq!(snap.today_secs, 45);
        assert_eq!(snap.week_secs, 45);
        assert_eq!(snap.last_tick_at, None);
    }

    #[test]
    fn tick_decrements_remaining_and_counts_usage() {
        let mut engine = engine_with_budget(60);
        engine.start(at(8, 0, 0)).unwrap();
        let out = engine.tick(at(8, 0, 10));

        assert_eq!(out.consumed_secs, 10);
        assert_eq!(engine.status().remaining_secs, 50);
        assert_eq!(engine.status().today_secs, 10);
    }

    #[test]
    fn debt_entry_and_exit() {
        let mut engine = engine_with_budget(30);
        engine.start(at(8, 0, 0)).unwrap();

        let out = engine.tick(at(8, 0, 45));
        assert_eq!(out.consumed_secs, 45);
        assert!(matches!(out.events[..], [Event::DebtEntered { debt_secs: 15, .. }]));
        assert_eq!(engine.status().state, PhaseKind::Debt);
        assert_eq!(engine.status().debt_secs, 15);
        assert_eq!(engine.status().remaining_secs, 0);

        let events = engine.add_time_from_quiz(at(8, 1, 0), 1.0).unwrap();
        assert!(matches!(
            events[..],
            [
                Event::GrantApplied { granted_secs: 60, .. },
                Event::DebtCleared { remaining_secs: 45, .. }
            ]
        ));
        assert_eq!(engine.status().state, PhaseKind::Running);
        assert_eq!(engine.status().remaining_secs, 45);
        assert_eq!(engine.status().debt_secs, 0);
    }

    #[test]
    fn partial_grant_shrinks_debt_without_leaving_it() {
        let mut engine = engine_with_budget(10);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 2, 10)); // 130s against 10s budget -> 120s debt

        let events = engine.add_time_from_quiz(at(8, 3, 0), 1.0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.status().state, PhaseKind::Debt);
        assert_eq!(engine.status().debt_secs, 60);
    }

    #[test]
    fn exact_exhaustion_stays_out_of_debt() {
        let mut engine = engine_with_budget(30);
        engine.start(at(8, 0, 0)).unwrap();
        let out = engine.tick(at(8, 0, 30));

        assert!(out.events.is_empty());
        assert_eq!(engine.status().state, PhaseKind::Running);
        assert_eq!(engine.status().remaining_secs, 0);
        assert_eq!(engine.status().debt_secs, 0);
    }

    #[test]
    fn pause_freezes_counters() {
        let mut engine = engine_with_budget(60);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 0, 10));
        assert!(engine.pause(at(8, 0, 10)).is_some());

        // No anchor while paused: later ticks charge nothing.
        let out = engine.tick(at(9, 0, 0));
        assert_eq!(out.consumed_secs, 0);
        assert_eq!(engine.status().remaining_secs, 50);
        assert_eq!(engine.status().today_secs, 10);

        // Resume keeps the frozen balance.
        assert!(engine.start(at(9, 0, 0)).unwrap().is_some());
        assert_eq!(engine.status().remaining_secs, 50);
    }

    #[test]
    fn pause_while_paused_or_in_debt_is_a_no_op() {
        let mut engine = engine_with_budget(10);
        engine.start(at(8, 0, 0)).unwrap();
        engine.pause(at(8, 0, 1));
        assert!(engine.pause(at(8, 0, 2)).is_none());

        let mut debtor = engine_with_budget(10);
        debtor.start(at(8, 0, 0)).unwrap();
        debtor.tick(at(8, 1, 0));
        assert_eq!(debtor.status().state, PhaseKind::Debt);
        assert!(debtor.pause(at(8, 1, 1)).is_none());
        assert_eq!(debtor.status().state, PhaseKind::Debt);
    }

    #[test]
    fn resume_with_empty_balance_fails() {
        let mut engine = engine_with_budget(10);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 0, 10));
        engine.pause(at(8, 0, 10));

        assert!(matches!(
            engine.start(at(8, 0, 20)),
            Err(BudgetError::NoBudget)
        ));
    }

    #[test]
    fn grants_while_inactive_accumulate() {
        let mut engine = BudgetEngine::new(day());
        engine.add_time_from_quiz(at(8, 0, 0), 2.0).unwrap();
        engine.add_time_from_goal(at(8, 5, 0), 0.5).unwrap();

        assert_eq!(engine.status().remaining_secs, 2 * 60 + 30 * 60);
        assert_eq!(engine.status().state, PhaseKind::Inactive);
    }

    #[test]
    fn invalid_grants_are_rejected_before_mutation() {
        let mut engine = engine_with_budget(60);
        let before = engine.snapshot().clone();

        assert!(engine.add_time_from_quiz(at(8, 0, 0), -1.0).is_err());
        assert!(engine.add_time_from_quiz(at(8, 0, 0), f64::NAN).is_err());
        assert!(engine.add_time_from_goal(at(8, 0, 0), f64::INFINITY).is_err());
        assert_eq!(engine.snapshot(), &before);
    }

    #[test]
    fn zero_grant_is_a_silent_no_op() {
        let mut engine = engine_with_budget(60);
        let events = engine.add_time_from_quiz(at(8, 0, 0), 0.0).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn foreground_switch_keeps_accounting() {
        let mut engine = engine_with_budget(60);
        engine.start(at(8, 0, 0)).unwrap();
        assert!(engine.set_foreground(at(8, 0, 5), true).is_some());
        assert_eq!(engine.status().state, PhaseKind::Foreground);

        engine.tick(at(8, 0, 15));
        assert_eq!(engine.status().remaining_secs, 45);

        assert!(engine.set_foreground(at(8, 0, 15), false).is_some());
        assert_eq!(engine.status().state, PhaseKind::Running);
        // Repeated report of the same focus is a no-op.
        assert!(engine.set_foreground(at(8, 0, 16), false).is_none());
    }

    #[test]
    fn backward_clock_applies_zero_elapsed() {
        let mut engine = engine_with_budget(60);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 0, 10));

        let out = engine.tick(at(7, 59, 0));
        assert!(out.anomaly);
        assert_eq!(out.consumed_secs, 0);
        assert_eq!(engine.status().remaining_secs, 50);
        // Anchor resets so the next forward tick charges from here.
        assert_eq!(engine.last_tick_at(), Some(at(7, 59, 0)));
    }

    #[test]
    fn tick_stops_at_the_day_boundary() {
        let mut engine = engine_with_budget(10 * 60);
        engine.start(at(23, 59, 0)).unwrap();

        let past_midnight = Utc.with_ymd_and_hms(2026, 3, 15, 0, 1, 0).unwrap();
        let out = engine.tick(past_midnight);

        assert!(out.crossed_day);
        assert_eq!(out.consumed_secs, 60);
        assert_eq!(engine.last_tick_at(), Some(day_end_utc(day())));
        assert_eq!(engine.day(), day());
    }

    #[test]
    fn begin_day_zeroes_budget_and_debt() {
        let mut engine = engine_with_budget(10);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 1, 0)); // into debt

        let next = day().succ_opt().unwrap();
        engine.begin_day(next, 0);

        assert_eq!(engine.day(), next);
        assert_eq!(engine.status().remaining_secs, 0);
        assert_eq!(engine.status().debt_secs, 0);
        assert_eq!(engine.status().today_secs, 0);
        assert_eq!(engine.status().state, PhaseKind::Running);
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let mut engine = engine_with_budget(90);
        engine.start(at(8, 0, 0)).unwrap();
        engine.tick(at(8, 0, 20));

        let json = serde_json::to_string(engine.snapshot()).unwrap();
        let restored = BudgetEngine::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(&restored, &engine);

        // Replaying the same elapsed time lands in the same place as an
        // uninterrupted run.
        let mut live = engine.clone();
        let mut rebooted = restored;
        let live_out = live.tick(at(8, 0, 50));
        let rebooted_out = rebooted.tick(at(8, 0, 50));
        assert_eq!(live_out.consumed_secs, rebooted_out.consumed_secs);
        assert_eq!(live.snapshot(), rebooted.snapshot());
    }
}
