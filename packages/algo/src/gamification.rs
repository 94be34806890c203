//! Gamification Engine
//!
//! Derives XP, daily streaks and achievement unlocks from answer events.
//! State goes in, state comes out; persistence and clocks belong to the
//! caller, which keeps every rule deterministically testable.

use chrono::{DateTime, Utc};

use crate::types::{GamificationState, XP_PER_CORRECT_ANSWER};

// ==================== Achievements ====================

/// Cumulative progress snapshot an achievement predicate is evaluated over
#[derive(Clone, Copy, Debug, Default)]
pub struct AchievementContext {
    /// Total correct answers across all words
    pub total_correct: i64,
    /// Words currently at the top mastery level
    pub mastered_words: i64,
    /// Current daily streak, after the triggering answer was applied
    pub current_streak: i32,
}

/// A static achievement definition
pub struct AchievementDef {
    /// Stable identifier, also the persistence key
    pub id: &'static str,
    /// Display title
    pub title: &'static str,
    /// One-time XP granted when the achievement unlocks
    pub xp_reward: i64,
    /// Unlock condition over cumulative progress state
    pub predicate: fn(&AchievementContext) -> bool,
}

/// All achievement definitions, evaluated in order
pub const ACHIEVEMENTS: &[AchievementDef] = &[
    AchievementDef {
        id: "first_correct",
        title: "Prima risposta",
        xp_reward: 10,
        predicate: |ctx| ctx.total_correct >= 1,
    },
    AchievementDef {
        id: "correct_100",
        title: "Cento risposte",
        xp_reward: 50,
        predicate: |ctx| ctx.total_correct >= 100,
    },
    AchievementDef {
        id: "streak_7",
        title: "Una settimana di fila",
        xp_reward: 30,
        predicate: |ctx| ctx.current_streak >= 7,
    },
    AchievementDef {
        id: "streak_30",
        title: "Un mese di fila",
        xp_reward: 100,
        predicate: |ctx| ctx.current_streak >= 30,
    },
    AchievementDef {
        id: "mastered_10",
        title: "Dieci parole padroneggiate",
        xp_reward: 40,
        predicate: |ctx| ctx.mastered_words >= 10,
    },
    AchievementDef {
        id: "mastered_50",
        title: "Cinquanta parole padroneggiate",
        xp_reward: 120,
        predicate: |ctx| ctx.mastered_words >= 50,
    },
];

/// Look up an achievement definition by id
pub fn achievement_by_id(id: &str) -> Option<&'static AchievementDef> {
    ACHIEVEMENTS.iter().find(|def| def.id == id)
}

/// Evaluate all not-yet-unlocked achievements against the given context.
///
/// Already-unlocked ids are skipped, which makes unlocking idempotent:
/// re-evaluating a satisfied predicate a second time yields nothing.
/// Never fails; an empty context simply unlocks nothing.
pub fn evaluate_unlocks(
    ctx: &AchievementContext,
    unlocked_ids: &[impl AsRef<str>],
) -> Vec<&'static AchievementDef> {
    ACHIEVEMENTS
        .iter()
        .filter(|def| !unlocked_ids.iter().any(|id| id.as_ref() == def.id))
        .filter(|def| (def.predicate)(ctx))
        .collect()
}

// ==================== Answer handling ====================

/// Apply one answer event to the gamification state.
///
/// - XP: a fixed reward per correct answer (achievement rewards are granted
///   separately by the caller once unlocks are known).
/// - Streak: activity yesterday extends it, activity today leaves it
///   unchanged (at most one increment per calendar day), any gap resets
///   it to 1.
/// - `longest_streak` is raised to the new `current_streak` when exceeded.
///
/// # Arguments
/// * `state` - current per-user state
/// * `correct` - whether the answer was correct
/// * `now` - event time; only its calendar date matters for the streak
pub fn on_answer(state: &GamificationState, correct: bool, now: DateTime<Utc>) -> GamificationState {
    let today = now.date_naive();
    let mut next = state.clone();

    if correct {
        next.total_xp += XP_PER_CORRECT_ANSWER;
    }

    match state.last_activity_date {
        Some(last) if last == today => {
            // Already counted today
        }
        Some(last) if last.succ_opt() == Some(today) => {
            next.current_streak = state.current_streak + 1;
        }
        _ => {
            // Gap of two or more days, or first ever activity
            next.current_streak = 1;
        }
    }

    next.longest_streak = next.longest_streak.max(next.current_streak);
    next.last_activity_date = Some(today);

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_correct_answer_grants_xp() {
        let state = GamificationState::default();
        let next = on_answer(&state, true, day(1));
        assert_eq!(next.total_xp, XP_PER_CORRECT_ANSWER);
    }

    #[test]
    fn test_wrong_answer_grants_no_xp_but_counts_activity() {
        let state = GamificationState::default();
        let next = on_answer(&state, false, day(1));
        assert_eq!(next.total_xp, 0);
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.last_activity_date, Some(day(1).date_naive()));
    }

    #[test]
    fn test_consecutive_days_extend_streak() {
        let mut state = GamificationState::default();
        state = on_answer(&state, true, day(1));
        state = on_answer(&state, true, day(2));
        assert_eq!(state.current_streak, 2);
        assert_eq!(state.longest_streak, 2);
    }

    #[test]
    fn test_same_day_does_not_double_count() {
        let mut state = GamificationState::default();
        state = on_answer(&state, true, day(1));
        state = on_answer(&state, true, day(1));
        state = on_answer(&state, false, day(1));
        assert_eq!(state.current_streak, 1);
    }

    #[test]
    fn test_gap_resets_streak_but_keeps_longest() {
        // Active day 1 and 2, skip day 3, active day 4
        let mut state = GamificationState::default();
        state = on_answer(&state, true, day(1));
        state = on_answer(&state, true, day(2));
        state = on_answer(&state, true, day(4));
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.longest_streak, 2);
    }

    #[test]
    fn test_longest_never_below_current() {
        let mut state = GamificationState::default();
        for d in 1..=20 {
            // Irregular pattern of activity and gaps
            if d % 5 == 0 {
                continue;
            }
            state = on_answer(&state, d % 3 == 0, day(d));
            assert!(
                state.longest_streak >= state.current_streak,
                "violated on day {}",
                d
            );
        }
    }

    #[test]
    fn test_first_correct_unlocks_once() {
        let ctx = AchievementContext {
            total_correct: 1,
            ..Default::default()
        };

        let unlocked = evaluate_unlocks(&ctx, &[] as &[&str]);
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id, "first_correct");

        // Already unlocked: re-evaluation yields nothing
        let again = evaluate_unlocks(&ctx, &["first_correct"]);
        assert!(again.is_empty());
    }

    #[test]
    fn test_streak_achievement() {
        let ctx = AchievementContext {
            total_correct: 200,
            current_streak: 7,
            ..Default::default()
        };
        let unlocked = evaluate_unlocks(&ctx, &["first_correct", "correct_100"]);
        let ids: Vec<_> = unlocked.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["streak_7"]);
    }

    #[test]
    fn test_multiple_unlocks_in_one_event() {
        let ctx = AchievementContext {
            total_correct: 100,
            mastered_words: 10,
            current_streak: 1,
        };
        let unlocked = evaluate_unlocks(&ctx, &["first_correct"]);
        let ids: Vec<_> = unlocked.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["correct_100", "mastered_10"]);
    }

    #[test]
    fn test_achievement_by_id() {
        assert!(achievement_by_id("streak_7").is_some());
        assert!(achievement_by_id("nope").is_none());
    }
}
