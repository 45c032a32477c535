//! Student-facing review endpoints: submit a review, fetch the due queue,
//! read progress and tune the per-user scheduling config.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use recall_engine::{AlgoConfig, UserStats};
use serde::{Deserialize, Serialize};

use crate::auth::require_student;
use crate::db::operations::learning as db;
use crate::response::{AppError, SuccessResponse};
use crate::services::review::{self, AlgoConfigUpdate};
use crate::state::AppState;

const MAX_PAGE_SIZE: i64 = 200;
const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    card_id: i64,
    quality: i32,
    #[serde(default)]
    study_time_ms: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressData {
    stats: UserStats,
    algo_config: AlgoConfig,
    #[serde(flatten)]
    counts: db::RetentionCounts,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/review", axum::routing::post(submit_review))
        .route("/due-cards", get(due_cards))
        .route("/progress", get(progress))
        .route("/review-logs", get(review_logs))
        .route("/algo-config", get(get_algo_config).put(update_algo_config))
}

async fn submit_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_review(req.quality, req.study_time_ms)?;
    let (db, user) = require_student(&state, &headers).await?;

    let outcome = review::review_card(
        db.as_ref(),
        user.id,
        req.card_id,
        req.quality,
        req.study_time_ms,
    )
    .await
    .map_err(db_error)?;

    Ok(Json(SuccessResponse::new(outcome)))
}

async fn due_cards(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_student(&state, &headers).await?;
    let cards = db::due_cards(db.pool(), user.id, Utc::now())
        .await
        .map_err(db_error)?;
    Ok(Json(SuccessResponse::new(cards)))
}

async fn progress(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_student(&state, &headers).await?;

    let stats = db::get_stats(db.pool(), user.id)
        .await
        .map_err(db_error)?
        .unwrap_or_default();
    let counts = db::retention_counts(db.pool(), user.id, Utc::now())
        .await
        .map_err(db_error)?;
    let algo_config = review::get_algo_config(db.as_ref(), user.id)
        .await
        .map_err(db_error)?;

    Ok(Json(SuccessResponse::new(ProgressData {
        stats,
        algo_config,
        counts,
    })))
}

async fn review_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (skip, limit) = normalize_page(page.skip, page.limit);
    let (db, user) = require_student(&state, &headers).await?;

    let logs = db::list_review_logs(db.pool(), user.id, skip, limit)
        .await
        .map_err(db_error)?;
    Ok(Json(SuccessResponse::new(logs)))
}

async fn get_algo_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_student(&state, &headers).await?;
    let config = review::get_algo_config(db.as_ref(), user.id)
        .await
        .map_err(db_error)?;
    Ok(Json(SuccessResponse::new(config)))
}

async fn update_algo_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<AlgoConfigUpdate>,
) -> Result<impl IntoResponse, AppError> {
    validate_config_update(&update)?;
    let (db, user) = require_student(&state, &headers).await?;

    let config = review::update_algo_config(db.as_ref(), user.id, update)
        .await
        .map_err(db_error)?;
    Ok(Json(SuccessResponse::new(config)))
}

fn validate_review(quality: i32, study_time_ms: i64) -> Result<(), AppError> {
    if !(0..=5).contains(&quality) {
        return Err(AppError::validation("quality must be between 0 and 5"));
    }
    if study_time_ms < 0 {
        return Err(AppError::validation("studyTimeMs must not be negative"));
    }
    Ok(())
}

fn validate_config_update(update: &AlgoConfigUpdate) -> Result<(), AppError> {
    let fields = [
        ("startingEase", update.starting_ease),
        ("intervalModifier", update.interval_modifier),
        ("easyBonus", update.easy_bonus),
        ("hardInterval", update.hard_interval),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            if !value.is_finite() || value <= 0.0 {
                return Err(AppError::validation(format!(
                    "{name} must be a positive number"
                )));
            }
        }
    }
    if let Some(ease) = update.starting_ease {
        if ease < 1.3 {
            return Err(AppError::validation("startingEase must be at least 1.3"));
        }
    }
    Ok(())
}

fn normalize_page(skip: i64, limit: Option<i64>) -> (i64, i64) {
    let skip = skip.max(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (skip, limit)
}

fn db_error(err: sqlx::Error) -> AppError {
    tracing::warn!(error = %err, "learning query failed");
    AppError::internal("Database error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_bounds_are_inclusive() {
        assert!(validate_review(0, 0).is_ok());
        assert!(validate_review(5, 0).is_ok());
        assert!(validate_review(-1, 0).is_err());
        assert!(validate_review(6, 0).is_err());
    }

    #[test]
    fn negative_study_time_is_rejected() {
        assert!(validate_review(4, -1).is_err());
        assert!(validate_review(4, 0).is_ok());
    }

    #[test]
    fn page_defaults_and_clamps() {
        assert_eq!(normalize_page(0, None), (0, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_page(-5, Some(0)), (0, 1));
        assert_eq!(normalize_page(10, Some(10_000)), (10, MAX_PAGE_SIZE));
    }

    #[test]
    fn config_update_rejects_bad_values() {
        let bad = AlgoConfigUpdate {
            easy_bonus: Some(-1.0),
            ..AlgoConfigUpdate::default()
        };
        assert!(validate_config_update(&bad).is_err());

        let low_ease = AlgoConfigUpdate {
            starting_ease: Some(1.0),
            ..AlgoConfigUpdate::default()
        };
        assert!(validate_config_update(&low_ease).is_err());

        let ok = AlgoConfigUpdate {
            starting_ease: Some(2.4),
            hard_interval: Some(1.1),
            ..AlgoConfigUpdate::default()
        };
        assert!(validate_config_update(&ok).is_ok());

        let nan = AlgoConfigUpdate {
            interval_modifier: Some(f64::NAN),
            ..AlgoConfigUpdate::default()
        };
        assert!(validate_config_update(&nan).is_err());
    }
}
