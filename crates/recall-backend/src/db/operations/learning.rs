//! Queries backing the review workflow: retention state, the append-only
//! review log, user statistics and per-user algorithm config.
//!
//! The review submission path runs inside one transaction and locks the
//! retention and stats rows (`FOR UPDATE`) before the read-modify-write, so
//! concurrent submissions for the same key cannot lose updates.

use chrono::{DateTime, NaiveDate, Utc};
use recall_engine::{AlgoConfig, CardStatus, RetentionState, UserStats};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCard {
    pub card_id: i64,
    #[serde(flatten)]
    pub state: RetentionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogRow {
    pub id: i64,
    pub card_id: i64,
    pub quality: i32,
    pub study_time_ms: i64,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionCounts {
    pub cards_due_today: i64,
    pub cards_in_learning: i64,
    pub cards_mastered: i64,
}

/// Inserts the seed retention row if the card has never been reviewed.
///
/// `SELECT ... FOR UPDATE` locks nothing when the row is absent, so the
/// review path seeds first; concurrent first reviews then serialize on the
/// insert's uniqueness check instead of both computing from scratch.
pub async fn ensure_retention_row(
    conn: &mut PgConnection,
    user_id: i64,
    card_id: i64,
    starting_ease: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO card_retention_data (user_id, card_id, ease_factor)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, card_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(card_id)
    .bind(starting_ease)
    .execute(conn)
    .await?;
    Ok(())
}

/// Same first-encounter seeding for the stats row.
pub async fn ensure_stats_row(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_stats (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_retention(
    pool: &PgPool,
    user_id: i64,
    card_id: i64,
) -> Result<Option<RetentionState>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT next_review, last_review, interval_days, ease_factor, repetition_count, status
        FROM card_retention_data
        WHERE user_id = $1 AND card_id = $2
        "#,
    )
    .bind(user_id)
    .bind(card_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_retention(&r)))
}

pub async fn get_retention_for_update(
    conn: &mut PgConnection,
    user_id: i64,
    card_id: i64,
) -> Result<Option<RetentionState>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT next_review, last_review, interval_days, ease_factor, repetition_count, status
        FROM card_retention_data
        WHERE user_id = $1 AND card_id = $2
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(card_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| map_retention(&r)))
}

pub async fn upsert_retention(
    conn: &mut PgConnection,
    user_id: i64,
    card_id: i64,
    state: &RetentionState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO card_retention_data (
            user_id, card_id, next_review, last_review,
            interval_days, ease_factor, repetition_count, status
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id, card_id) DO UPDATE SET
            next_review = EXCLUDED.next_review,
            last_review = EXCLUDED.last_review,
            interval_days = EXCLUDED.interval_days,
            ease_factor = EXCLUDED.ease_factor,
            repetition_count = EXCLUDED.repetition_count,
            status = EXCLUDED.status
        "#,
    )
    .bind(user_id)
    .bind(card_id)
    .bind(state.next_review)
    .bind(state.last_review)
    .bind(state.interval_days)
    .bind(state.ease_factor)
    .bind(state.repetition_count)
    .bind(state.status.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_review_log(
    conn: &mut PgConnection,
    user_id: i64,
    card_id: i64,
    quality: i32,
    study_time_ms: i64,
    reviewed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO review_logs (user_id, card_id, quality, study_time_ms, reviewed_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(card_id)
    .bind(quality)
    .bind(study_time_ms)
    .bind(reviewed_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_stats_for_update(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Option<UserStats>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT total_xp, current_streak, longest_streak, last_study_date, cards_learned
        FROM user_stats
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| map_stats(&r)))
}

pub async fn get_stats(pool: &PgPool, user_id: i64) -> Result<Option<UserStats>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT total_xp, current_streak, longest_streak, last_study_date, cards_learned
        FROM user_stats
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_stats(&r)))
}

pub async fn upsert_stats(
    conn: &mut PgConnection,
    user_id: i64,
    stats: &UserStats,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_stats (
            user_id, total_xp, current_streak, longest_streak, last_study_date, cards_learned
        ) VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO UPDATE SET
            total_xp = EXCLUDED.total_xp,
            current_streak = EXCLUDED.current_streak,
            longest_streak = EXCLUDED.longest_streak,
            last_study_date = EXCLUDED.last_study_date,
            cards_learned = EXCLUDED.cards_learned
        "#,
    )
    .bind(user_id)
    .bind(stats.total_xp)
    .bind(stats.current_streak)
    .bind(stats.longest_streak)
    .bind(stats.last_study_date)
    .bind(stats.cards_learned)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_algo_config(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Option<AlgoConfig>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT starting_ease, interval_modifier, easy_bonus, hard_interval
        FROM algo_configs
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| map_algo_config(&r)))
}

pub async fn upsert_algo_config(
    conn: &mut PgConnection,
    user_id: i64,
    config: &AlgoConfig,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO algo_configs (
            user_id, starting_ease, interval_modifier, easy_bonus, hard_interval
        ) VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            starting_ease = EXCLUDED.starting_ease,
            interval_modifier = EXCLUDED.interval_modifier,
            easy_bonus = EXCLUDED.easy_bonus,
            hard_interval = EXCLUDED.hard_interval
        "#,
    )
    .bind(user_id)
    .bind(config.starting_ease)
    .bind(config.interval_modifier)
    .bind(config.easy_bonus)
    .bind(config.hard_interval)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn due_cards(
    pool: &PgPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<DueCard>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT card_id, next_review, last_review, interval_days, ease_factor,
               repetition_count, status
        FROM card_retention_data
        WHERE user_id = $1 AND next_review <= $2
        ORDER BY next_review ASC
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| DueCard {
            card_id: row.try_get("card_id").unwrap_or_default(),
            state: map_retention(row),
        })
        .collect())
}

pub async fn list_review_logs(
    pool: &PgPool,
    user_id: i64,
    skip: i64,
    limit: i64,
) -> Result<Vec<ReviewLogRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, card_id, quality, study_time_ms, reviewed_at
        FROM review_logs
        WHERE user_id = $1
        ORDER BY reviewed_at DESC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ReviewLogRow {
            id: row.try_get("id").unwrap_or_default(),
            card_id: row.try_get("card_id").unwrap_or_default(),
            quality: row.try_get("quality").unwrap_or_default(),
            study_time_ms: row.try_get("study_time_ms").unwrap_or_default(),
            reviewed_at: row.try_get("reviewed_at").unwrap_or_else(|_| Utc::now()),
        })
        .collect())
}

pub async fn retention_counts(
    pool: &PgPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<RetentionCounts, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE next_review IS NOT NULL AND next_review <= $2) AS due_today,
            COUNT(*) FILTER (WHERE status = 'LEARNING') AS in_learning,
            COUNT(*) FILTER (WHERE status = 'REVIEW') AS mastered
        FROM card_retention_data
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(RetentionCounts {
        cards_due_today: row.try_get("due_today").unwrap_or(0),
        cards_in_learning: row.try_get("in_learning").unwrap_or(0),
        cards_mastered: row.try_get("mastered").unwrap_or(0),
    })
}

fn map_retention(row: &PgRow) -> RetentionState {
    let status_raw: String = row.try_get("status").unwrap_or_default();
    RetentionState {
        next_review: row.try_get::<Option<DateTime<Utc>>, _>("next_review").unwrap_or(None),
        last_review: row.try_get::<Option<DateTime<Utc>>, _>("last_review").unwrap_or(None),
        interval_days: row.try_get("interval_days").unwrap_or(0),
        ease_factor: row.try_get("ease_factor").unwrap_or(2.5),
        repetition_count: row.try_get("repetition_count").unwrap_or(0),
        status: CardStatus::parse(&status_raw).unwrap_or(CardStatus::New),
    }
}

fn map_stats(row: &PgRow) -> UserStats {
    UserStats {
        total_xp: row.try_get("total_xp").unwrap_or(0),
        current_streak: row.try_get("current_streak").unwrap_or(0),
        longest_streak: row.try_get("longest_streak").unwrap_or(0),
        last_study_date: row.try_get::<Option<NaiveDate>, _>("last_study_date").unwrap_or(None),
        cards_learned: row.try_get("cards_learned").unwrap_or(0),
    }
}

fn map_algo_config(row: &PgRow) -> AlgoConfig {
    let defaults = AlgoConfig::default();
    AlgoConfig {
        starting_ease: row.try_get("starting_ease").unwrap_or(defaults.starting_ease),
        interval_modifier: row
            .try_get("interval_modifier")
            .unwrap_or(defaults.interval_modifier),
        easy_bonus: row.try_get("easy_bonus").unwrap_or(defaults.easy_bonus),
        hard_interval: row.try_get("hard_interval").unwrap_or(defaults.hard_interval),
    }
}
