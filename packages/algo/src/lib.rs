//! # parole-algo - Core algorithms for vocabulary progress tracking
//!
//! This crate provides the pure-Rust derivations behind the progress engine:
//!
//! - **Mastery levels** - accuracy/attempt thresholds mapping answer history to a 0-5 level
//! - **Review scheduling** - Leitner-style intervals and due-date classification
//! - **Gamification** - XP, levels, daily streaks and achievement unlocks
//!
//! ## Design goals
//!
//! - **Pure functions** - no storage, no clocks; every input (including "now") is a parameter
//! - **Deterministic** - the same answer history always yields the same derived state
//! - **Fully tested** - every threshold and boundary has a unit test
//!
//! ## Module structure
//!
//! - [`mastery`] - mastery level computation from answer counters
//! - [`schedule`] - next-review dates and overdue/due-today/due-soon classification
//! - [`gamification`] - XP/streak updates and achievement evaluation
//! - [`types`] - shared types and constants
//!
//! ## Usage example
//!
//! ```rust
//! use parole_algo::{compute_mastery_level, ReviewIntervals, next_review_date};
//!
//! // 5 correct answers out of 5 attempts reaches the top level
//! let level = compute_mastery_level(5, 0);
//! assert_eq!(level, 5);
//!
//! let intervals = ReviewIntervals::default();
//! let due = next_review_date(&intervals, level, chrono::Utc::now());
//! ```

// ============================================================================
// Module declarations
// ============================================================================

pub mod gamification;
pub mod mastery;
pub mod schedule;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

/// Re-export shared types and constants
pub use types::*;

/// Re-export the mastery calculator
pub use mastery::compute_mastery_level;

/// Re-export the review scheduler
pub use schedule::{classify, next_review_date, priority_key, ReviewIntervals};

/// Re-export the gamification engine
pub use gamification::{
    achievement_by_id, evaluate_unlocks, on_answer, AchievementContext, AchievementDef,
    ACHIEVEMENTS,
};
