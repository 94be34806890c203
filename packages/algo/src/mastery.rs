//! Mastery Level Calculator
//!
//! Maps a word's cumulative answer counters to a mastery level in [0, 5].
//! Each level requires a minimum number of attempts and a minimum running
//! accuracy; the table is evaluated from the top level downward and the
//! first satisfied row wins.

use crate::types::{MAX_MASTERY_LEVEL, MIN_MASTERY_LEVEL};

/// One row of the mastery table: (level, min attempts, min accuracy)
///
/// Level 1 and 0 are not in the table: a single attempt is enough for
/// level 1, zero attempts means level 0.
const MASTERY_TABLE: [(i32, i32, f64); 4] = [
    (5, 5, 0.90),
    (4, 4, 0.80),
    (3, 3, 0.70),
    (2, 2, 0.60),
];

/// Compute the mastery level for a word from its answer counters.
///
/// Pure and side-effect free; negative inputs are defensively clamped
/// to zero. The result is always within `[0, 5]`.
///
/// # Arguments
/// * `correct_count` - cumulative correct answers
/// * `wrong_count` - cumulative wrong answers
pub fn compute_mastery_level(correct_count: i32, wrong_count: i32) -> i32 {
    let correct = correct_count.max(0);
    let wrong = wrong_count.max(0);
    let attempts = correct + wrong;

    if attempts == 0 {
        return MIN_MASTERY_LEVEL;
    }

    let accuracy = f64::from(correct) / f64::from(attempts);

    for (level, min_attempts, min_accuracy) in MASTERY_TABLE {
        if attempts >= min_attempts && accuracy >= min_accuracy {
            return level.min(MAX_MASTERY_LEVEL);
        }
    }

    // At least one attempt but no higher row satisfied
    1
}
