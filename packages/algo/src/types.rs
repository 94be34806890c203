//! Common Types and Constants
//!
//! Shared data structures used across all algorithm modules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// Lowest mastery level (no attempts yet)
pub const MIN_MASTERY_LEVEL: i32 = 0;

/// Highest mastery level
pub const MAX_MASTERY_LEVEL: i32 = 5;

/// XP granted for every correct answer
pub const XP_PER_CORRECT_ANSWER: i64 = 10;

/// XP required per level; level = total_xp / XP_PER_LEVEL + 1
pub const XP_PER_LEVEL: i64 = 100;

/// Default forward window (days after today) for the "due soon" bucket
pub const DEFAULT_DUE_SOON_WINDOW_DAYS: i64 = 3;

// ==================== Scheduling Types ====================

/// Classification of a word relative to its next review date
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    /// Next review date lies before the start of today
    Overdue,
    /// Next review date falls on today's calendar date
    DueToday,
    /// Next review date falls within the forward window after today
    DueSoon,
    /// Next review date lies beyond the forward window
    NotDue,
}

impl DueStatus {
    /// Whether the word should be offered for review at all
    pub fn is_due(&self) -> bool {
        !matches!(self, Self::NotDue)
    }
}

// ==================== Gamification Types ====================

/// Per-user gamification state
///
/// An explicit record passed into and returned from [`crate::on_answer`],
/// never a module-level singleton. The level is always derived from
/// `total_xp` and is intentionally not a field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationState {
    /// Accumulated experience points
    pub total_xp: i64,
    /// Consecutive calendar days with at least one answer event
    pub current_streak: i32,
    /// Best streak ever reached; invariant: `longest_streak >= current_streak`
    pub longest_streak: i32,
    /// Calendar date of the most recent answer event
    pub last_activity_date: Option<NaiveDate>,
}

impl Default for GamificationState {
    fn default() -> Self {
        Self {
            total_xp: 0,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
        }
    }
}

impl GamificationState {
    /// Derived level: `total_xp / 100 + 1`
    pub fn level(&self) -> i32 {
        (self.total_xp / XP_PER_LEVEL + 1) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_derivation() {
        let mut state = GamificationState::default();
        assert_eq!(state.level(), 1);

        state.total_xp = 99;
        assert_eq!(state.level(), 1);

        state.total_xp = 100;
        assert_eq!(state.level(), 2);

        state.total_xp = 1050;
        assert_eq!(state.level(), 11);
    }

    #[test]
    fn test_due_status_is_due() {
        assert!(DueStatus::Overdue.is_due());
        assert!(DueStatus::DueToday.is_due());
        assert!(DueStatus::DueSoon.is_due());
        assert!(!DueStatus::NotDue.is_due());
    }
}
