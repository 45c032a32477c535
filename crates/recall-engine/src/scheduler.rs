//! SM-2 variant review scheduling.
//!
//! One deterministic transition per review: quality rating plus the stored
//! retention values in, next interval / ease / repetition count / status out.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlgoConfig, CardStatus};

/// Floor for the ease factor, enforced on every computation path.
pub const MIN_EASE: f64 = 1.3;

/// Ease penalty applied when a review fails.
const FAILURE_EASE_PENALTY: f64 = 0.2;

/// Quality ratings below this fail the review and lapse the card.
const PASSING_QUALITY: i32 = 3;

/// Result of scheduling one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduled {
    pub next_review: DateTime<Utc>,
    pub interval_days: i32,
    pub ease_factor: f64,
    pub repetition_count: i32,
    pub status: CardStatus,
}

/// Computes the successor retention values for one review.
///
/// `quality` must already be validated to 0-5 by the caller; the function is
/// total over that domain. `config.starting_ease` is not consulted here - it
/// only seeds the first retention record.
///
/// The hard-interval adjustment applies to the lowest passing rating
/// (`quality == 3`): the card was recalled, but barely, so the interval
/// growth is damped by `hard_interval` instead of the full ease product.
pub fn schedule(
    quality: i32,
    current_ease: f64,
    current_interval_days: i32,
    repetition_count: i32,
    config: &AlgoConfig,
    now: DateTime<Utc>,
) -> Scheduled {
    if quality < PASSING_QUALITY {
        // Lapse: back to a one-day interval, ease docked, streak of
        // consecutive successes reset.
        let ease = (current_ease - FAILURE_EASE_PENALTY).max(MIN_EASE);
        return Scheduled {
            next_review: now + Duration::days(1),
            interval_days: 1,
            ease_factor: ease,
            repetition_count: 0,
            status: CardStatus::Relearning,
        };
    }

    let mut interval = match repetition_count {
        0 => 1,
        1 => 6,
        _ => (current_interval_days as f64 * current_ease * config.interval_modifier) as i32,
    };

    if quality == 5 {
        interval = (interval as f64 * config.easy_bonus) as i32;
    }
    if quality == PASSING_QUALITY {
        interval = ((interval as f64 * config.hard_interval) as i32).max(1);
    }

    let spread = (5 - quality) as f64;
    let ease = (current_ease + (0.1 - spread * (0.08 + spread * 0.02))).max(MIN_EASE);

    let status = if repetition_count == 0 {
        CardStatus::Learning
    } else {
        CardStatus::Review
    };

    Scheduled {
        next_review: now + Duration::days(interval as i64),
        interval_days: interval,
        ease_factor: ease,
        repetition_count: repetition_count + 1,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn failing_quality_lapses_the_card() {
        for quality in 0..3 {
            let out = schedule(quality, 2.5, 12, 4, &AlgoConfig::default(), at_noon());
            assert_eq!(out.status, CardStatus::Relearning);
            assert_eq!(out.interval_days, 1);
            assert_eq!(out.repetition_count, 0);
            assert!((out.ease_factor - 2.3).abs() < 1e-9);
            assert_eq!(out.next_review, at_noon() + Duration::days(1));
        }
    }

    #[test]
    fn failure_ease_penalty_respects_floor() {
        let out = schedule(0, 1.35, 6, 2, &AlgoConfig::default(), at_noon());
        assert_eq!(out.ease_factor, MIN_EASE);
    }

    #[test]
    fn first_success_gets_one_day_and_learning() {
        let out = schedule(4, 2.5, 0, 0, &AlgoConfig::default(), at_noon());
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.status, CardStatus::Learning);
        assert_eq!(out.repetition_count, 1);
        // q=4 leaves the ease untouched: 0.1 - 1*(0.08 + 1*0.02) == 0.
        assert!((out.ease_factor - 2.5).abs() < 1e-9);
    }

    #[test]
    fn second_success_gets_six_days_and_review() {
        let out = schedule(4, 2.5, 1, 1, &AlgoConfig::default(), at_noon());
        assert_eq!(out.interval_days, 6);
        assert_eq!(out.status, CardStatus::Review);
        assert_eq!(out.repetition_count, 2);
    }

    #[test]
    fn mature_interval_grows_by_ease_times_modifier() {
        let out = schedule(4, 2.6, 6, 2, &AlgoConfig::default(), at_noon());
        assert_eq!(out.interval_days, 15); // floor(6 * 2.6 * 1.0)
        assert_eq!(out.status, CardStatus::Review);
    }

    #[test]
    fn easy_quality_applies_bonus_and_raises_ease() {
        let out = schedule(5, 2.5, 6, 2, &AlgoConfig::default(), at_noon());
        // base floor(6 * 2.5) = 15, then floor(15 * 1.3) = 19
        assert_eq!(out.interval_days, 19);
        assert!((out.ease_factor - 2.6).abs() < 1e-9);
    }

    #[test]
    fn hard_pass_applies_hard_interval() {
        // Lowest passing rating stretches the interval by hard_interval.
        let out = schedule(3, 2.6, 6, 2, &AlgoConfig::default(), at_noon());
        assert_eq!(out.interval_days, 18); // max(1, floor(floor(6*2.6) * 1.2))
        assert!((out.ease_factor - 2.46).abs() < 1e-9);
        assert_eq!(out.status, CardStatus::Review);
    }

    #[test]
    fn hard_adjustment_never_drops_below_one_day() {
        let config = AlgoConfig {
            hard_interval: 0.2,
            ..AlgoConfig::default()
        };
        let out = schedule(3, 1.3, 0, 0, &config, at_noon());
        assert_eq!(out.interval_days, 1);
    }

    #[test]
    fn plain_pass_takes_no_bonus() {
        let out = schedule(4, 2.5, 10, 3, &AlgoConfig::default(), at_noon());
        assert_eq!(out.interval_days, 25); // floor(10 * 2.5), untouched
    }

    #[test]
    fn success_after_relearning_reenters_learning() {
        // A lapse resets repetitions to 0, so the next pass takes the
        // first-success path.
        let lapsed = schedule(1, 2.5, 15, 5, &AlgoConfig::default(), at_noon());
        assert_eq!(lapsed.status, CardStatus::Relearning);
        let out = schedule(
            4,
            lapsed.ease_factor,
            lapsed.interval_days,
            lapsed.repetition_count,
            &AlgoConfig::default(),
            at_noon(),
        );
        assert_eq!(out.status, CardStatus::Learning);
        assert_eq!(out.interval_days, 1);
    }

    #[test]
    fn quality_one_fails_rather_than_marking_hard() {
        // quality 1 is below passing, so it always lapses; the hard-interval
        // rule only exists inside the passing branch.
        let out = schedule(1, 2.6, 6, 2, &AlgoConfig::default(), at_noon());
        assert_eq!(out.status, CardStatus::Relearning);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.repetition_count, 0);
    }

    proptest! {
        #[test]
        fn ease_never_below_floor(
            quality in 0i32..=5,
            ease in 1.3f64..4.0,
            interval in 0i32..10_000,
            reps in 0i32..200,
        ) {
            let out = schedule(quality, ease, interval, reps, &AlgoConfig::default(), at_noon());
            prop_assert!(out.ease_factor >= MIN_EASE);
        }

        #[test]
        fn repetitions_reset_exactly_on_failure(
            quality in 0i32..=5,
            reps in 0i32..200,
        ) {
            let out = schedule(quality, 2.5, 3, reps, &AlgoConfig::default(), at_noon());
            if quality < 3 {
                prop_assert_eq!(out.repetition_count, 0);
            } else {
                prop_assert_eq!(out.repetition_count, reps + 1);
            }
        }

        #[test]
        fn next_review_matches_interval(
            quality in 0i32..=5,
            ease in 1.3f64..4.0,
            interval in 0i32..10_000,
            reps in 0i32..200,
        ) {
            let out = schedule(quality, ease, interval, reps, &AlgoConfig::default(), at_noon());
            prop_assert!(out.interval_days >= 0);
            prop_assert_eq!(
                out.next_review,
                at_noon() + Duration::days(out.interval_days as i64)
            );
        }
    }
}
