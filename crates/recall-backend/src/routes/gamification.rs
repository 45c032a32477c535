//! Badge catalog, per-user badge progress and the XP leaderboard.
//!
//! Claiming a badge pays its XP reward into `user_stats.total_xp`; the
//! claim runs in a transaction and locks the user-badge row so a repeated
//! claim cannot pay twice.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::auth::{require_admin, require_student};
use crate::response::{AppError, SuccessResponse};
use crate::state::AppState;

const DEFAULT_LEADERBOARD_SIZE: i64 = 20;
const MAX_LEADERBOARD_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BadgeDto {
    id: i64,
    name: String,
    description: String,
    icon_url: String,
    criteria: serde_json::Value,
    reward_xp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserBadgeDto {
    badge_id: i64,
    name: String,
    description: String,
    icon_url: String,
    reward_xp: i64,
    status: String,
    progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    unlocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBadgeRequest {
    name: String,
    description: String,
    #[serde(default)]
    icon_url: String,
    criteria: serde_json::Value,
    reward_xp: i64,
}

/// Partial badge edit; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBadgeRequest {
    name: Option<String>,
    description: Option<String>,
    icon_url: Option<String>,
    criteria: Option<serde_json::Value>,
    reward_xp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockRequest {
    progress: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimData {
    badge_id: i64,
    status: String,
    reward_xp: i64,
    total_xp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardEntry {
    rank: i64,
    user_id: i64,
    username: String,
    total_xp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardData {
    entries: Vec<LeaderboardEntry>,
    my_rank: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/badges", get(list_badges).post(create_badge))
        .route("/badges/my", get(my_badges))
        .route(
            "/badges/:id",
            get(get_badge).put(update_badge).delete(delete_badge),
        )
        .route("/badges/:id/unlock", put(unlock_badge))
        .route("/badges/:id/claim", post(claim_badge))
        .route("/leaderboard", get(leaderboard))
}

async fn list_badges(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, _user) = require_student(&state, &headers).await?;

    let rows = sqlx::query(
        r#"
        SELECT id, name, description, icon_url, criteria_json, reward_xp
        FROM badges
        ORDER BY id ASC
        "#,
    )
    .fetch_all(db.pool())
    .await
    .map_err(db_error)?;

    let badges: Vec<BadgeDto> = rows.iter().map(map_badge).collect();
    Ok(Json(SuccessResponse::new(badges)))
}

async fn create_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBadgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }
    if req.reward_xp < 0 {
        return Err(AppError::validation("rewardXp must not be negative"));
    }
    let (db, _admin) = require_admin(&state, &headers).await?;

    let row = sqlx::query(
        r#"
        INSERT INTO badges (name, description, icon_url, criteria_json, reward_xp)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, description, icon_url, criteria_json, reward_xp
        "#,
    )
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.icon_url)
    .bind(req.criteria.to_string())
    .bind(req.reward_xp)
    .fetch_one(db.pool())
    .await
    .map_err(db_error)?;

    Ok(Json(SuccessResponse::new(map_badge(&row))))
}

async fn get_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(badge_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (db, _user) = require_student(&state, &headers).await?;

    let row = sqlx::query(
        r#"
        SELECT id, name, description, icon_url, criteria_json, reward_xp
        FROM badges
        WHERE id = $1
        "#,
    )
    .bind(badge_id)
    .fetch_optional(db.pool())
    .await
    .map_err(db_error)?;

    let Some(row) = row else {
        return Err(AppError::not_found("Badge not found"));
    };
    Ok(Json(SuccessResponse::new(map_badge(&row))))
}

async fn update_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(badge_id): Path<i64>,
    Json(req): Json<UpdateBadgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_badge_update(&req)?;
    let (db, _admin) = require_admin(&state, &headers).await?;

    let row = sqlx::query(
        r#"
        UPDATE badges SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            icon_url = COALESCE($4, icon_url),
            criteria_json = COALESCE($5, criteria_json),
            reward_xp = COALESCE($6, reward_xp)
        WHERE id = $1
        RETURNING id, name, description, icon_url, criteria_json, reward_xp
        "#,
    )
    .bind(badge_id)
    .bind(req.name.as_deref())
    .bind(req.description.as_deref())
    .bind(req.icon_url.as_deref())
    .bind(req.criteria.as_ref().map(|value| value.to_string()))
    .bind(req.reward_xp)
    .fetch_optional(db.pool())
    .await
    .map_err(db_error)?;

    let Some(row) = row else {
        return Err(AppError::not_found("Badge not found"));
    };
    Ok(Json(SuccessResponse::new(map_badge(&row))))
}

async fn delete_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(badge_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (db, _admin) = require_admin(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM badges WHERE id = $1")
        .bind(badge_id)
        .execute(db.pool())
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Badge not found"));
    }
    Ok(Json(SuccessResponse::new(serde_json::json!({
        "badgeId": badge_id,
        "deleted": true,
    }))))
}

async fn my_badges(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_student(&state, &headers).await?;

    let rows = sqlx::query(
        r#"
        SELECT b.id AS badge_id, b.name, b.description, b.icon_url, b.reward_xp,
               COALESCE(ub.status, 'LOCKED') AS status,
               COALESCE(ub.progress, 0) AS progress,
               ub.unlocked_at, ub.claimed_at
        FROM badges b
        LEFT JOIN user_badges ub ON ub.badge_id = b.id AND ub.user_id = $1
        ORDER BY b.id ASC
        "#,
    )
    .bind(user.id)
    .fetch_all(db.pool())
    .await
    .map_err(db_error)?;

    let badges: Vec<UserBadgeDto> = rows
        .iter()
        .map(|row| UserBadgeDto {
            badge_id: row.try_get("badge_id").unwrap_or_default(),
            name: row.try_get("name").unwrap_or_default(),
            description: row.try_get("description").unwrap_or_default(),
            icon_url: row.try_get("icon_url").unwrap_or_default(),
            reward_xp: row.try_get("reward_xp").unwrap_or_default(),
            status: row
                .try_get("status")
                .unwrap_or_else(|_| "LOCKED".to_string()),
            progress: row.try_get("progress").unwrap_or(0),
            unlocked_at: row.try_get("unlocked_at").unwrap_or(None),
            claimed_at: row.try_get("claimed_at").unwrap_or(None),
        })
        .collect();

    Ok(Json(SuccessResponse::new(badges)))
}

async fn unlock_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(badge_id): Path<i64>,
    Json(req): Json<UnlockRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !(0..=100).contains(&req.progress) {
        return Err(AppError::validation("progress must be between 0 and 100"));
    }
    let (db, user) = require_student(&state, &headers).await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM badges WHERE id = $1")
        .bind(badge_id)
        .fetch_optional(db.pool())
        .await
        .map_err(db_error)?;
    if exists.is_none() {
        return Err(AppError::not_found("Badge not found"));
    }

    // A CLAIMED badge is final; progress updates must not demote it.
    let row = sqlx::query(
        r#"
        INSERT INTO user_badges (user_id, badge_id, status, progress, unlocked_at)
        VALUES ($1, $2, CASE WHEN $3 >= 100 THEN 'UNLOCKED' ELSE 'LOCKED' END, $3,
                CASE WHEN $3 >= 100 THEN NOW() ELSE NULL END)
        ON CONFLICT (user_id, badge_id) DO UPDATE SET
            progress = GREATEST(user_badges.progress, EXCLUDED.progress),
            status = CASE
                WHEN user_badges.status = 'CLAIMED' THEN 'CLAIMED'
                WHEN GREATEST(user_badges.progress, EXCLUDED.progress) >= 100 THEN 'UNLOCKED'
                ELSE user_badges.status
            END,
            unlocked_at = CASE
                WHEN user_badges.unlocked_at IS NOT NULL THEN user_badges.unlocked_at
                WHEN GREATEST(user_badges.progress, EXCLUDED.progress) >= 100 THEN NOW()
                ELSE NULL
            END
        RETURNING status, progress, unlocked_at
        "#,
    )
    .bind(user.id)
    .bind(badge_id)
    .bind(req.progress)
    .fetch_one(db.pool())
    .await
    .map_err(db_error)?;

    let status: String = row.try_get("status").unwrap_or_else(|_| "LOCKED".to_string());
    let progress: i32 = row.try_get("progress").unwrap_or(0);
    let unlocked_at: Option<DateTime<Utc>> = row.try_get("unlocked_at").unwrap_or(None);

    Ok(Json(SuccessResponse::new(serde_json::json!({
        "badgeId": badge_id,
        "status": status,
        "progress": progress,
        "unlockedAt": unlocked_at,
    }))))
}

async fn claim_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(badge_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_student(&state, &headers).await?;

    let mut tx = db.pool().begin().await.map_err(db_error)?;

    let row = sqlx::query(
        r#"
        SELECT ub.status, b.reward_xp
        FROM user_badges ub
        JOIN badges b ON b.id = ub.badge_id
        WHERE ub.user_id = $1 AND ub.badge_id = $2
        FOR UPDATE OF ub
        "#,
    )
    .bind(user.id)
    .bind(badge_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error)?;

    let Some(row) = row else {
        return Err(AppError::not_found("Badge not unlocked"));
    };

    let status: String = row.try_get("status").unwrap_or_default();
    let reward_xp: i64 = row.try_get("reward_xp").unwrap_or(0);

    match status.as_str() {
        "UNLOCKED" => {}
        "CLAIMED" => return Err(AppError::bad_request("Badge already claimed")),
        _ => return Err(AppError::bad_request("Badge is not unlocked")),
    }

    sqlx::query(
        r#"
        UPDATE user_badges
        SET status = 'CLAIMED', claimed_at = NOW()
        WHERE user_id = $1 AND badge_id = $2
        "#,
    )
    .bind(user.id)
    .bind(badge_id)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    let total_xp: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO user_stats (user_id, total_xp)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET
            total_xp = user_stats.total_xp + EXCLUDED.total_xp
        RETURNING total_xp
        "#,
    )
    .bind(user.id)
    .bind(reward_xp)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    Ok(Json(SuccessResponse::new(ClaimData {
        badge_id,
        status: "CLAIMED".to_string(),
        reward_xp,
        total_xp,
    })))
}

async fn leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let skip = query.skip.max(0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD_SIZE);
    let (db, user) = require_student(&state, &headers).await?;

    let rows = sqlx::query(
        r#"
        SELECT RANK() OVER (ORDER BY s.total_xp DESC, s.user_id ASC) AS rank,
               s.user_id, u.username, s.total_xp
        FROM user_stats s
        JOIN users u ON u.id = s.user_id
        ORDER BY s.total_xp DESC, s.user_id ASC
        OFFSET $1 LIMIT $2
        "#,
    )
    .bind(skip)
    .bind(limit)
    .fetch_all(db.pool())
    .await
    .map_err(db_error)?;

    let entries: Vec<LeaderboardEntry> = rows
        .iter()
        .map(|row| LeaderboardEntry {
            rank: row.try_get("rank").unwrap_or(0),
            user_id: row.try_get("user_id").unwrap_or_default(),
            username: row.try_get("username").unwrap_or_default(),
            total_xp: row.try_get("total_xp").unwrap_or(0),
        })
        .collect();

    let my_rank: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT rank FROM (
            SELECT user_id, RANK() OVER (ORDER BY total_xp DESC, user_id ASC) AS rank
            FROM user_stats
        ) ranked
        WHERE user_id = $1
        "#,
    )
    .bind(user.id)
    .fetch_optional(db.pool())
    .await
    .map_err(db_error)?;

    Ok(Json(SuccessResponse::new(LeaderboardData {
        entries,
        my_rank,
    })))
}

fn map_badge(row: &sqlx::postgres::PgRow) -> BadgeDto {
    let criteria_raw: String = row.try_get("criteria_json").unwrap_or_default();
    BadgeDto {
        id: row.try_get("id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        description: row.try_get("description").unwrap_or_default(),
        icon_url: row.try_get("icon_url").unwrap_or_default(),
        criteria: serde_json::from_str(&criteria_raw).unwrap_or(serde_json::Value::Null),
        reward_xp: row.try_get("reward_xp").unwrap_or(0),
    }
}

fn validate_badge_update(req: &UpdateBadgeRequest) -> Result<(), AppError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }
    }
    if let Some(reward_xp) = req.reward_xp {
        if reward_xp < 0 {
            return Err(AppError::validation("rewardXp must not be negative"));
        }
    }
    Ok(())
}

fn db_error(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "gamification query failed");
    AppError::internal("Database error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_update_allows_empty_payload() {
        assert!(validate_badge_update(&UpdateBadgeRequest::default()).is_ok());
    }

    #[test]
    fn badge_update_rejects_blank_name_and_negative_xp() {
        let blank = UpdateBadgeRequest {
            name: Some("   ".to_string()),
            ..UpdateBadgeRequest::default()
        };
        assert!(validate_badge_update(&blank).is_err());

        let negative = UpdateBadgeRequest {
            reward_xp: Some(-5),
            ..UpdateBadgeRequest::default()
        };
        assert!(validate_badge_update(&negative).is_err());

        let ok = UpdateBadgeRequest {
            name: Some("Seven-day streak".to_string()),
            reward_xp: Some(50),
            ..UpdateBadgeRequest::default()
        };
        assert!(validate_badge_update(&ok).is_ok());
    }
}
