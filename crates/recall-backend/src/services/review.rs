//! Review orchestration: one submission updates retention state, appends a
//! log entry and folds the outcome into the user's statistics, all inside a
//! single transaction.

use chrono::Utc;
use recall_engine::{apply_review, AlgoConfig, RetentionState, UserStats};
use serde::{Deserialize, Serialize};

use crate::db::operations::learning;
use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub card_id: i64,
    pub retention: RetentionState,
    pub stats: UserStats,
    pub xp_awarded: i64,
    pub newly_mastered: bool,
}

/// Partial config update; absent fields keep their stored value.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoConfigUpdate {
    pub starting_ease: Option<f64>,
    pub interval_modifier: Option<f64>,
    pub easy_bonus: Option<f64>,
    pub hard_interval: Option<f64>,
}

impl AlgoConfigUpdate {
    pub fn merged_into(self, base: AlgoConfig) -> AlgoConfig {
        AlgoConfig {
            starting_ease: self.starting_ease.unwrap_or(base.starting_ease),
            interval_modifier: self.interval_modifier.unwrap_or(base.interval_modifier),
            easy_bonus: self.easy_bonus.unwrap_or(base.easy_bonus),
            hard_interval: self.hard_interval.unwrap_or(base.hard_interval),
        }
    }
}

/// Applies one review. Locks the retention row and the stats row before the
/// read-modify-write so a concurrent submission for the same card serializes
/// behind this one instead of clobbering it.
pub async fn review_card(
    db: &Database,
    user_id: i64,
    card_id: i64,
    quality: i32,
    study_time_ms: i64,
) -> Result<ReviewOutcome, sqlx::Error> {
    let now = Utc::now();
    let mut tx = db.pool().begin().await?;

    let config = match learning::get_algo_config(&mut tx, user_id).await? {
        Some(config) => config,
        None => {
            let defaults = AlgoConfig::default();
            learning::upsert_algo_config(&mut tx, user_id, &defaults).await?;
            defaults
        }
    };

    // Seed missing rows before locking: FOR UPDATE cannot lock an absent
    // row, and two concurrent first reviews must not both start from the
    // seeded state.
    learning::ensure_retention_row(&mut tx, user_id, card_id, config.starting_ease).await?;
    learning::ensure_stats_row(&mut tx, user_id).await?;

    let previous = learning::get_retention_for_update(&mut tx, user_id, card_id)
        .await?
        .unwrap_or_else(|| RetentionState::seeded(config.starting_ease));
    let previous_status = previous.status;

    let retention = previous.reviewed(quality, &config, now);
    learning::upsert_retention(&mut tx, user_id, card_id, &retention).await?;
    learning::insert_review_log(&mut tx, user_id, card_id, quality, study_time_ms, now).await?;

    let stats_before = learning::get_stats_for_update(&mut tx, user_id)
        .await?
        .unwrap_or_default();
    let xp_before = stats_before.total_xp;

    let stats = apply_review(stats_before, now.date_naive(), previous_status, retention.status);
    learning::upsert_stats(&mut tx, user_id, &stats).await?;

    tx.commit().await?;

    let xp_awarded = stats.total_xp - xp_before;
    Ok(ReviewOutcome {
        card_id,
        retention,
        stats,
        xp_awarded,
        newly_mastered: xp_awarded > 0,
    })
}

pub async fn get_algo_config(db: &Database, user_id: i64) -> Result<AlgoConfig, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    Ok(learning::get_algo_config(&mut conn, user_id)
        .await?
        .unwrap_or_default())
}

pub async fn update_algo_config(
    db: &Database,
    user_id: i64,
    update: AlgoConfigUpdate,
) -> Result<AlgoConfig, sqlx::Error> {
    let mut tx = db.pool().begin().await?;
    let base = learning::get_algo_config(&mut tx, user_id)
        .await?
        .unwrap_or_default();
    let merged = update.merged_into(base);
    learning::upsert_algo_config(&mut tx, user_id, &merged).await?;
    tx.commit().await?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_keeps_unset_fields() {
        let base = AlgoConfig::default();
        let update = AlgoConfigUpdate {
            easy_bonus: Some(1.5),
            ..AlgoConfigUpdate::default()
        };
        let merged = update.merged_into(base);
        assert_eq!(merged.easy_bonus, 1.5);
        assert_eq!(merged.starting_ease, base.starting_ease);
        assert_eq!(merged.interval_modifier, base.interval_modifier);
        assert_eq!(merged.hard_interval, base.hard_interval);
    }

    #[test]
    fn full_update_replaces_everything() {
        let update = AlgoConfigUpdate {
            starting_ease: Some(2.3),
            interval_modifier: Some(0.9),
            easy_bonus: Some(1.4),
            hard_interval: Some(1.1),
        };
        let merged = update.merged_into(AlgoConfig::default());
        assert_eq!(merged.starting_ease, 2.3);
        assert_eq!(merged.interval_modifier, 0.9);
        assert_eq!(merged.easy_bonus, 1.4);
        assert_eq!(merged.hard_interval, 1.1);
    }
}
