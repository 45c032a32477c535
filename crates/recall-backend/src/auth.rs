//! Token verification for requests reaching the learning and gamification
//! surface. Session issuance (login, registration, refresh) belongs to the
//! account service; this module only validates what it minted.

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::db::Database;
use crate::response::{json_error, AppError};
use crate::state::AppState;

const AUTH_COOKIE_NAME: &str = "auth_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Student,
    PaidStudent,
    Teacher,
    Admin,
}

impl UserRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STUDENT" => Some(UserRole::Student),
            "PAID_STUDENT" => Some(UserRole::PaidStudent),
            "TEACHER" => Some(UserRole::Teacher),
            "ADMIN" => Some(UserRole::Admin),
            _ => None,
        }
    }

    pub fn is_student(self) -> bool {
        matches!(self, UserRole::Student | UserRole::PaidStudent)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    pub role: UserRole,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("missing JWT_SECRET")]
    MissingSecret,
    #[error("account locked")]
    AccountLocked,
    #[error("database error: {0}")]
    Database(String),
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.to_string())
}

pub async fn verify_request_token(db: &Database, token: &str) -> Result<AuthUser, AuthError> {
    let secret = std::env::var("JWT_SECRET").map_err(|_| AuthError::MissingSecret)?;
    let claims = verify_jwt_hs256(token, &secret)?;

    let token_hash = hash_token(token);
    verify_session_and_load_user(db.pool(), claims.user_id, &token_hash).await
}

/// Token plus role gate used by learning routes: students only.
pub async fn require_student(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Database>, AuthUser), AppError> {
    let (db, user) = require_user(state, headers).await?;
    if !user.role.is_student() {
        return Err(AppError::forbidden("Student role required"));
    }
    Ok((db, user))
}

pub async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Database>, AuthUser), AppError> {
    let (db, user) = require_user(state, headers).await?;
    if user.role != UserRole::Admin {
        return Err(AppError::forbidden("Admin role required"));
    }
    Ok((db, user))
}

pub async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Database>, AuthUser), AppError> {
    let token = extract_token(headers)
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing auth token"))?;

    let db = state
        .db()
        .ok_or_else(|| AppError::service_unavailable("Service unavailable"))?;

    let user = verify_request_token(db.as_ref(), &token)
        .await
        .map_err(|err| match err {
            AuthError::AccountLocked => AppError::forbidden("User account is locked"),
            _ => json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication failed",
            ),
        })?;

    Ok((db, user))
}

#[derive(Debug, Clone)]
struct JwtClaims {
    user_id: i64,
}

fn verify_jwt_hs256(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;

    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    let alg = header_json
        .get("alg")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?;
    if alg != "HS256" {
        return Err(AuthError::InvalidToken);
    }

    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    validate_registered_claims(&payload_json)?;

    // "sub" is the user id, as a string or a bare number.
    let user_id = match payload_json.get("sub") {
        Some(serde_json::Value::String(raw)) => raw.parse::<i64>().ok(),
        Some(serde_json::Value::Number(raw)) => raw.as_i64(),
        _ => None,
    }
    .ok_or(AuthError::InvalidToken)?;

    Ok(JwtClaims { user_id })
}

fn validate_registered_claims(payload: &serde_json::Value) -> Result<(), AuthError> {
    let now = Utc::now().timestamp();

    if let Some(exp) = payload.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::InvalidToken);
        }
    }

    if let Some(nbf) = payload.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::InvalidToken);
        }
    }

    Ok(())
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

async fn verify_session_and_load_user(
    pool: &PgPool,
    expected_user_id: i64,
    token_hash: &str,
) -> Result<AuthUser, AuthError> {
    let session_row = sqlx::query(
        r#"
        SELECT user_id, expires_at
        FROM sessions
        WHERE token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .map_err(|err| AuthError::Database(err.to_string()))?;

    let Some(session_row) = session_row else {
        return Err(AuthError::InvalidToken);
    };

    let session_user_id: i64 = session_row
        .try_get("user_id")
        .map_err(|err| AuthError::Database(err.to_string()))?;
    let session_expires_at: DateTime<Utc> = session_row
        .try_get("expires_at")
        .map_err(|err| AuthError::Database(err.to_string()))?;

    if session_user_id != expected_user_id {
        return Err(AuthError::InvalidToken);
    }
    if session_expires_at < Utc::now() {
        return Err(AuthError::InvalidToken);
    }

    let user_row = sqlx::query(
        r#"
        SELECT id, email, username, role::text AS role, status::text AS status
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(expected_user_id)
    .fetch_optional(pool)
    .await
    .map_err(|err| AuthError::Database(err.to_string()))?;

    let Some(user_row) = user_row else {
        return Err(AuthError::InvalidToken);
    };

    let status: String = user_row.try_get("status").unwrap_or_default();
    if status != "ACTIVE" {
        return Err(AuthError::AccountLocked);
    }

    let role_raw: String = user_row.try_get("role").unwrap_or_default();
    let role = UserRole::parse(&role_raw).ok_or(AuthError::InvalidToken)?;

    Ok(AuthUser {
        id: user_row.try_get("id").unwrap_or_default(),
        email: user_row.try_get("email").unwrap_or_default(),
        username: user_row.try_get("username").unwrap_or_default(),
        role,
    })
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())?;

    for pair in cookie_header.split(';') {
        let mut iter = pair.trim().splitn(2, '=');
        let key = iter.next().unwrap_or("");
        if key == name {
            return iter.next().map(|value| value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_token(&headers), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn cookie_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "auth_token=from-cookie".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(extract_token(&headers), Some("from-cookie".to_string()));
    }

    #[test]
    fn missing_token_is_none() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn role_parse_and_student_gate() {
        assert!(UserRole::parse("STUDENT").unwrap().is_student());
        assert!(UserRole::parse("PAID_STUDENT").unwrap().is_student());
        assert!(!UserRole::parse("TEACHER").unwrap().is_student());
        assert!(!UserRole::parse("ADMIN").unwrap().is_student());
        assert_eq!(UserRole::parse("ROOT"), None);
    }

    #[test]
    fn token_hash_is_stable_sha256_hex() {
        let hash = hash_token("token");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("token"));
        assert_ne!(hash, hash_token("other"));
    }
}
