//! Streak tracking system
//!
//! Habit streaks advance only when a check-in lands exactly one period after
//! the previous one. Check-ins dated on or before the last completion are
//! recorded as history but never move the counters.

use chrono::{Days, Months, NaiveDate};
use serde::Serialize;

use super::models::{Frequency, Habit};

impl Frequency {
    /// The date exactly one period after `date`.
    ///
    /// Monthly periods clamp to the end of shorter months (Jan 31 -> Feb 28/29).
    pub fn next_period(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => date.checked_add_days(Days::new(1)),
            Self::Weekly => date.checked_add_days(Days::new(7)),
            Self::Monthly => date.checked_add_months(Months::new(1)),
        }
    }
}

/// How a check-in changed the habit's streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// Chained from the previous period
    Extended,
    /// First check-in ever, or the previous period was missed
    Started,
    /// Dated on or before the last completion; counters untouched
    Backfilled,
    /// A log for this date already existed
    Duplicate,
}

/// Result of a habit check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakResult {
    pub habit: Habit,
    pub log_created: bool,
    pub change: StreakChange,
}

impl StreakResult {
    /// Result for a date that was already checked in
    pub fn duplicate(habit: Habit) -> Self {
        Self {
            habit,
            log_created: false,
            change: StreakChange::Duplicate,
        }
    }
}

/// Compute the habit's counters after a new (not yet logged) check-in on `date`
pub fn apply_check_in(habit: &Habit, date: NaiveDate) -> (Habit, StreakChange) {
    let mut updated = habit.clone();

    let change = match habit.last_completed_date {
        Some(last) if date <= last => return (updated, StreakChange::Backfilled),
        Some(last) if habit.frequency.next_period(last) == Some(date) => StreakChange::Extended,
        _ => StreakChange::Started,
    };

    updated.current_streak = match change {
        StreakChange::Extended => habit.current_streak.saturating_add(1),
        _ => 1,
    };
    updated.longest_streak = updated.longest_streak.max(updated.current_streak);
    updated.last_completed_date = Some(date);

    (updated, change)
}

impl Habit {
    /// Check if the streak can still be extended (next period not yet missed)
    pub fn is_streak_active(&self, today: NaiveDate) -> bool {
        let Some(last) = self.last_completed_date else {
            return false;
        };
        match self.frequency.next_period(last) {
            Some(next) => today <= next,
            None => true,
        }
    }

    /// Streak as it stands today: zero once a period has been missed
    pub fn effective_streak(&self, today: NaiveDate) -> u32 {
        if self.is_streak_active(today) {
            self.current_streak
        } else {
            0
        }
    }
}

/// Advance a run of consecutive days.
///
/// Same day keeps the run, the next day extends it, anything else restarts at 1.
/// Dates before `last` leave the run unchanged.
pub fn advance_daily_run(last: Option<NaiveDate>, date: NaiveDate, run: u64) -> (Option<NaiveDate>, u64) {
    match last {
        Some(last) if date < last => (Some(last), run),
        Some(last) if date == last => (Some(last), run.max(1)),
        Some(last) if Frequency::Daily.next_period(last) == Some(date) => {
            (Some(date), run.saturating_add(1))
        }
        _ => (Some(date), 1),
    }
}
