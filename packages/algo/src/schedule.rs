//! Review Scheduler
//!
//! Leitner-style scheduling: the review interval grows with the mastery
//! level. Also classifies a word as overdue / due today / due soon / not due
//! relative to a given "now", and provides the priority ordering used to
//! surface the weakest and stalest words first.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::DueStatus;

/// Review interval table, in days added to the last practice time.
///
/// The table is configuration rather than hard business fact: callers that
/// need the alternative 14/90 reading can override it in one place. The
/// default encodes the shipped convention, with 90 days reserved for
/// levels beyond the current 0-5 range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIntervals {
    /// Days per level for levels 0..=5
    pub days_by_level: [i64; 6],
    /// Days for any level above 5 (reserved / future)
    pub extended_days: i64,
}

impl Default for ReviewIntervals {
    fn default() -> Self {
        Self {
            days_by_level: [0, 1, 3, 7, 14, 30],
            extended_days: 90,
        }
    }
}

impl ReviewIntervals {
    /// Interval in days for the given mastery level.
    ///
    /// Negative levels are treated as level 0 (due immediately).
    pub fn days_for(&self, level: i32) -> i64 {
        if level <= 0 {
            return self.days_by_level[0];
        }
        match self.days_by_level.get(level as usize) {
            Some(days) => *days,
            None => self.extended_days,
        }
    }
}

/// Next review timestamp for a word at the given level.
///
/// Level 0 yields `last_practiced` itself: the word is due immediately.
pub fn next_review_date(
    intervals: &ReviewIntervals,
    level: i32,
    last_practiced: DateTime<Utc>,
) -> DateTime<Utc> {
    last_practiced + Duration::days(intervals.days_for(level))
}

/// Classify a next-review timestamp relative to `now`.
///
/// A word without a progress record has no next review date and is always
/// due; callers pass `None` for that case.
///
/// # Arguments
/// * `next_review` - the scheduled review timestamp, if any
/// * `now` - current time
/// * `due_soon_window_days` - forward window after today for the "due soon" bucket
pub fn classify(
    next_review: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    due_soon_window_days: i64,
) -> DueStatus {
    let next = match next_review {
        Some(next) => next,
        None => return DueStatus::DueToday,
    };

    let today = now.date_naive();
    let start_of_today = today
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);

    if next < start_of_today {
        DueStatus::Overdue
    } else if next.date_naive() == today {
        DueStatus::DueToday
    } else if next.date_naive() <= today + Duration::days(due_soon_window_days.max(0)) {
        DueStatus::DueSoon
    } else {
        DueStatus::NotDue
    }
}

/// Sort key for due-word ordering: ascending mastery level first, then
/// ascending last-practiced time with never-practiced words first of all.
pub fn priority_key(mastery_level: i32, last_practiced: Option<DateTime<Utc>>) -> (i32, i64) {
    let practiced = match last_practiced {
        Some(t) => t.timestamp_millis(),
        None => i64::MIN,
    };
    (mastery_level, practiced)
}
