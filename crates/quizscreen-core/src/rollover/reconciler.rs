//! Day rollover reconciliation.
//!
//! On the first observation of a new calendar day the reconciler seals the
//! finished day's record, settles its carryover score into the running
//! total, and resets the day-scoped counters. The settle step is guarded by
//! a per-date processed marker, so retries after a crash or a duplicated
//! check never credit twice. Cold-start gaps are replayed through the
//! engine in bounded chunks, one day at a time, so a boundary inside the
//! gap is reconciled rather than skipped.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

use super::day_record::{CarryoverInfo, DayRecord};
use super::policy::{CarryoverPolicy, WeekReset};
use crate::budget::BudgetEngine;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::storage::Database;

fn marker_key(date: NaiveDate) -> String {
    format!("carryover_applied:{date}")
}

/// Settles finished days against the durable store.
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    policy: CarryoverPolicy,
    week_reset: WeekReset,
}

impl Reconciler {
    pub fn new(db: Database, policy: CarryoverPolicy, week_reset: WeekReset) -> Self {
        Self {
            db,
            policy,
            week_reset,
        }
    }

    /// Replay the gap since the engine's last tick in bounded chunks and
    /// settle every day boundary found inside it. Returns the events in
    /// transition order and whether any rollover was performed.
    ///
    /// The engine is only advanced past a boundary once that day's
    /// settlement has been durably committed; a persistence failure leaves
    /// the engine on the old day and the next check retries.
    pub fn catch_up(
        &self,
        engine: &mut BudgetEngine,
        now: DateTime<Utc>,
        chunk_secs: u64,
    ) -> Result<(Vec<Event>, bool)> {
        let mut events = Vec::new();
        let mut rolled = false;
        let chunk = Duration::seconds(chunk_secs.max(1) as i64);

        while let Some(last) = engine.last_tick_at() {
            if last >= now {
                break;
            }
            let target = now.min(last + chunk);
            let out = engine.tick(target);
            events.extend(out.events);
            if out.crossed_day {
                self.process_one_day(engine, now, &mut events)?;
                rolled = true;
                continue;
            }
            if out.anomaly || out.consumed_secs == 0 {
                break;
            }
        }

        // Day changes also happen while paused or inactive, with no tick
        // anchor to replay.
        while engine.day() < now.date_naive() {
            self.process_one_day(engine, now, &mut events)?;
            rolled = true;
        }

        Ok((events, rolled))
    }

    /// Seal the engine's current day, settle its score, and move the engine
    /// to the following day. Durable commit happens before the in-memory
    /// advance.
    fn process_one_day(
        &self,
        engine: &mut BudgetEngine,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let sealed_day = engine.day();
        let next_day = sealed_day
            .succ_opt()
            .ok_or_else(|| CoreError::Custom(format!("no day after {sealed_day}")))?;
        let record = self.build_record(engine, now, true);

        let week_secs = match self.week_reset {
            _ if self.week_reset.resets_on(next_day) => 0,
            WeekReset::Rolling => {
                let from = next_day - Duration::days(6);
                // The sealed day is committed in the same transaction below,
                // so account for it directly.
                self.db.usage_secs_between(from, sealed_day)?
                    + if sealed_day >= from {
                        record.used_minutes * 60
                    } else {
                        0
                    }
            }
            WeekReset::Weekday(_) => engine.snapshot().week_secs,
        };

        let mut next_engine = engine.clone();
        next_engine.begin_day(next_day, week_secs);

        let applied = self
            .db
            .commit_rollover(&record, &marker_key(sealed_day), next_engine.snapshot())?;
        *engine = next_engine;

        info!(
            day = %sealed_day,
            score = record.applied_carryover_score,
            applied,
            "day sealed"
        );
        events.push(Event::DayRolledOver {
            day: sealed_day,
            carryover_score: record.applied_carryover_score,
            applied,
            at: now,
        });
        Ok(())
    }

    /// Write a provisional record for the current day without settling any
    /// score. Used on app backgrounding or termination so the day's totals
    /// survive a kill. Returns false when the day is already sealed.
    pub fn seal_provisional(&self, engine: &BudgetEngine, now: DateTime<Utc>) -> Result<bool> {
        let date = engine.day();
        if let Some(existing) = self.db.get_day_record(date)? {
            if existing.sealed {
                return Ok(false);
            }
        }
        self.db.upsert_day_record(&self.build_record(engine, now, false))?;
        Ok(true)
    }

    /// Carryover summary of the day before `now`'s, if it has been recorded.
    pub fn carryover_info(&self, now: DateTime<Utc>) -> Result<Option<CarryoverInfo>> {
        let Some(yesterday) = now.date_naive().pred_opt() else {
            return Ok(None);
        };
        Ok(self
            .db
            .get_day_record(yesterday)?
            .as_ref()
            .map(CarryoverInfo::from))
    }

    /// The running score as of the start of today. The rollover is the only
    /// writer of the total, so the total *is* the day's starting score.
    pub fn today_start_score(&self) -> Result<i64> {
        Ok(self.db.total_score()?)
    }

    fn build_record(&self, engine: &BudgetEngine, now: DateTime<Utc>, seal: bool) -> DayRecord {
        let snap = engine.snapshot();
        let remaining_minutes = snap.phase.remaining_secs() / 60;
        let overtime_minutes = snap.phase.debt_secs() / 60;
        let potential = self.policy.score(remaining_minutes, overtime_minutes);
        DayRecord {
            date: snap.day,
            remaining_minutes,
            overtime_minutes,
            used_minutes: snap.today_secs / 60,
            potential_carryover_score: potential,
            applied_carryover_score: if seal { potential } else { 0 },
            is_positive: potential >= 0,
            sealed: seal,
            sealed_at: seal.then_some(now),
        }
    }
}
