//! Carryover scoring and week-boundary rules.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Converts a day's leftover minutes into a score adjustment.
///
/// Unused budget rewards, overtime penalizes; both scale linearly and the
/// result is clamped so one extreme day cannot swamp the running total.
/// The rates come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryoverPolicy {
    pub reward_per_minute: i64,
    pub penalty_per_minute: i64,
    /// Magnitude cap on a single day's adjustment.
    pub max_daily_score: i64,
}

impl Default for CarryoverPolicy {
    fn default() -> Self {
        Self {
            reward_per_minute: 2,
            penalty_per_minute: 3,
            max_daily_score: 240,
        }
    }
}

impl CarryoverPolicy {
    pub fn score(&self, remaining_minutes: u64, overtime_minutes: u64) -> i64 {
        let reward = self
            .reward_per_minute
            .saturating_mul(i64::try_from(remaining_minutes).unwrap_or(i64::MAX));
        let penalty = self
            .penalty_per_minute
            .saturating_mul(i64::try_from(overtime_minutes).unwrap_or(i64::MAX));
        reward
            .saturating_sub(penalty)
            .clamp(-self.max_daily_score, self.max_daily_score)
    }
}

/// When the weekly usage counter resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekReset {
    /// Zeroed whenever a new day lands on this weekday.
    Weekday(Weekday),
    /// Derived from the trailing seven days of recorded usage instead of a
    /// fixed boundary.
    Rolling,
}

impl Default for WeekReset {
    fn default() -> Self {
        WeekReset::Weekday(Weekday::Mon)
    }
}

impl WeekReset {
    /// Whether starting `day` crosses the fixed week boundary.
    pub fn resets_on(&self, day: NaiveDate) -> bool {
        match self {
            WeekReset::Weekday(start) => day.weekday() == *start,
            WeekReset::Rolling => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surplus_rewards_and_overtime_penalizes() {
        let policy = CarryoverPolicy::default();
        assert_eq!(policy.score(20, 0), 40);
        assert_eq!(policy.score(0, 10), -30);
        assert_eq!(policy.score(0, 0), 0);
    }

    #[test]
    fn score_is_monotonic_in_both_directions() {
        let policy = CarryoverPolicy::default();
        assert!(policy.score(30, 0) > policy.score(20, 0));
        assert!(policy.score(0, 30) < policy.score(0, 20));
    }

    #[test]
    fn extreme_days_are_clamped() {
        let policy = CarryoverPolicy::default();
        assert_eq!(policy.score(100_000, 0), 240);
        assert_eq!(policy.score(0, 100_000), -240);
    }

    #[test]
    fn week_resets_only_on_the_configured_weekday() {
        let reset = WeekReset::Weekday(Weekday::Mon);
        let monday = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 17).unwrap();
        assert!(reset.resets_on(monday));
        assert!(!reset.resets_on(tuesday));
        assert!(!WeekReset::Rolling.resets_on(monday));
    }
}
