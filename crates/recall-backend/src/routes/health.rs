use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthData {
    status: &'static str,
    database: &'static str,
    uptime_seconds: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/live", get(live))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.db() {
        Some(db) => match db.ping().await {
            Ok(()) => "up",
            Err(_) => "down",
        },
        None => "not_configured",
    };

    Json(HealthData {
        status: if database == "down" { "degraded" } else { "ok" },
        database,
        uptime_seconds: state.uptime_seconds(),
    })
}

async fn live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
