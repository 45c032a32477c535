use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a card in the review pipeline.
///
/// `New` is the only initial state and there is no terminal state: review is
/// unbounded. Any failed review moves the card to `Relearning`; the next
/// success re-enters `Learning` because the repetition count was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            CardStatus::New => "NEW",
            CardStatus::Learning => "LEARNING",
            CardStatus::Review => "REVIEW",
            CardStatus::Relearning => "RELEARNING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(CardStatus::New),
            "LEARNING" => Some(CardStatus::Learning),
            "REVIEW" => Some(CardStatus::Review),
            "RELEARNING" => Some(CardStatus::Relearning),
            _ => None,
        }
    }
}

/// Per-user tunable scheduling parameters.
///
/// `starting_ease` only seeds the very first retention record of a card; the
/// transition function itself never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoConfig {
    pub starting_ease: f64,
    pub interval_modifier: f64,
    pub easy_bonus: f64,
    pub hard_interval: f64,
}

impl Default for AlgoConfig {
    fn default() -> Self {
        Self {
            starting_ease: 2.5,
            interval_modifier: 1.0,
            easy_bonus: 1.3,
            hard_interval: 1.2,
        }
    }
}

/// Per-user, per-card scheduling bookkeeping.
///
/// Invariants: `ease_factor >= 1.3` always, `repetition_count` counts
/// consecutive successes since the last lapse, `next_review`/`last_review`
/// are absent only before the first review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionState {
    pub next_review: Option<DateTime<Utc>>,
    pub last_review: Option<DateTime<Utc>>,
    pub interval_days: i32,
    pub ease_factor: f64,
    pub repetition_count: i32,
    pub status: CardStatus,
}

impl RetentionState {
    /// Fresh state for a card seen for the first time.
    pub fn seeded(starting_ease: f64) -> Self {
        Self {
            next_review: None,
            last_review: None,
            interval_days: 0,
            ease_factor: starting_ease,
            repetition_count: 0,
            status: CardStatus::New,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_review, Some(next) if next <= now)
    }

    /// Applies one review and returns the successor state.
    pub fn reviewed(&self, quality: i32, config: &AlgoConfig, now: DateTime<Utc>) -> Self {
        let out = crate::scheduler::schedule(
            quality,
            self.ease_factor,
            self.interval_days,
            self.repetition_count,
            config,
            now,
        );
        Self {
            next_review: Some(out.next_review),
            last_review: Some(now),
            interval_days: out.interval_days,
            ease_factor: out.ease_factor,
            repetition_count: out.repetition_count,
            status: out.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            CardStatus::New,
            CardStatus::Learning,
            CardStatus::Review,
            CardStatus::Relearning,
        ] {
            assert_eq!(CardStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CardStatus::parse("SUSPENDED"), None);
    }

    #[test]
    fn seeded_state_is_new_and_never_due() {
        let state = RetentionState::seeded(2.5);
        assert_eq!(state.status, CardStatus::New);
        assert_eq!(state.ease_factor, 2.5);
        assert_eq!(state.repetition_count, 0);
        assert!(!state.is_due(Utc::now()));
    }

    #[test]
    fn due_when_next_review_in_the_past() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut state = RetentionState::seeded(2.5);
        state.next_review = Some(now - chrono::Duration::hours(1));
        assert!(state.is_due(now));
        state.next_review = Some(now + chrono::Duration::hours(1));
        assert!(!state.is_due(now));
    }

    #[test]
    fn reviewed_records_both_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let state = RetentionState::seeded(2.5).reviewed(4, &AlgoConfig::default(), now);
        assert_eq!(state.last_review, Some(now));
        assert_eq!(state.next_review, Some(now + chrono::Duration::days(1)));
        assert_eq!(state.status, CardStatus::Learning);
    }
}
