//! Streak and mastery bookkeeping derived from review transitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::CardStatus;

/// XP awarded the first time a card reaches `REVIEW` status.
pub const MASTERY_XP: i64 = 10;

/// Per-user study statistics.
///
/// Zero-valued defaults stand in for a missing record; absence is an
/// expected first-encounter state, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_xp: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_study_date: Option<NaiveDate>,
    pub cards_learned: i32,
}

/// Folds one review outcome into the user's statistics and returns the
/// updated record.
///
/// Streaks are calendar-date arithmetic only: a second review on the same
/// date leaves the streak alone, a gap of exactly one day extends it, any
/// longer gap restarts it at 1. `last_study_date` is always advanced, even
/// on the same-day case.
///
/// The mastery reward fires at most once per card: when the transition
/// enters `REVIEW` from any other status.
pub fn apply_review(
    stats: UserStats,
    study_date: NaiveDate,
    previous_status: CardStatus,
    new_status: CardStatus,
) -> UserStats {
    let mut next = stats;

    match next.last_study_date {
        None => next.current_streak = 1,
        Some(last) => {
            let days_diff = (study_date - last).num_days();
            if days_diff == 1 {
                next.current_streak += 1;
            } else if days_diff > 1 {
                next.current_streak = 1;
            }
            // days_diff == 0: same-day review, streak unchanged.
        }
    }
    next.longest_streak = next.longest_streak.max(next.current_streak);
    next.last_study_date = Some(study_date);

    if new_status == CardStatus::Review && previous_status != CardStatus::Review {
        next.cards_learned += 1;
        next.total_xp += MASTERY_XP;
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn first_ever_review_starts_streak_at_one() {
        let out = apply_review(
            UserStats::default(),
            day(10),
            CardStatus::New,
            CardStatus::Learning,
        );
        assert_eq!(out.current_streak, 1);
        assert_eq!(out.longest_streak, 1);
        assert_eq!(out.last_study_date, Some(day(10)));
    }

    #[test]
    fn same_day_review_leaves_streak_but_updates_date() {
        let stats = UserStats {
            current_streak: 4,
            longest_streak: 7,
            last_study_date: Some(day(10)),
            ..UserStats::default()
        };
        let out = apply_review(stats, day(10), CardStatus::Learning, CardStatus::Learning);
        assert_eq!(out.current_streak, 4);
        assert_eq!(out.longest_streak, 7);
        assert_eq!(out.last_study_date, Some(day(10)));
    }

    #[test]
    fn next_day_review_extends_streak() {
        let stats = UserStats {
            current_streak: 4,
            longest_streak: 4,
            last_study_date: Some(day(10)),
            ..UserStats::default()
        };
        let out = apply_review(stats, day(11), CardStatus::Review, CardStatus::Review);
        assert_eq!(out.current_streak, 5);
        assert_eq!(out.longest_streak, 5);
    }

    #[test]
    fn gap_of_two_days_resets_streak() {
        let stats = UserStats {
            current_streak: 9,
            longest_streak: 9,
            last_study_date: Some(day(10)),
            ..UserStats::default()
        };
        let out = apply_review(stats, day(12), CardStatus::Review, CardStatus::Review);
        assert_eq!(out.current_streak, 1);
        assert_eq!(out.longest_streak, 9);
    }

    #[test]
    fn entering_review_awards_mastery_once() {
        let out = apply_review(
            UserStats::default(),
            day(10),
            CardStatus::Learning,
            CardStatus::Review,
        );
        assert_eq!(out.cards_learned, 1);
        assert_eq!(out.total_xp, MASTERY_XP);

        // Already mastered: a further passing review must not re-award.
        let again = apply_review(out, day(11), CardStatus::Review, CardStatus::Review);
        assert_eq!(again.cards_learned, 1);
        assert_eq!(again.total_xp, MASTERY_XP);
    }

    #[test]
    fn relearning_back_to_review_awards_again_path() {
        // A lapsed card that climbs back counts as entering REVIEW anew;
        // previous status was RELEARNING-derived LEARNING, not REVIEW.
        let stats = UserStats {
            cards_learned: 1,
            total_xp: 10,
            ..UserStats::default()
        };
        let out = apply_review(stats, day(10), CardStatus::Learning, CardStatus::Review);
        assert_eq!(out.cards_learned, 2);
        assert_eq!(out.total_xp, 20);
    }

    #[test]
    fn failed_review_still_counts_for_streak() {
        let stats = UserStats {
            current_streak: 2,
            longest_streak: 2,
            last_study_date: Some(day(10)),
            ..UserStats::default()
        };
        let out = apply_review(stats, day(11), CardStatus::Review, CardStatus::Relearning);
        assert_eq!(out.current_streak, 3);
        assert_eq!(out.cards_learned, 0);
        assert_eq!(out.total_xp, 0);
    }
}
