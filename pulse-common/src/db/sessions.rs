//! API session storage
//!
//! Only the SHA-256 hash of each token is stored; the plain token is handed
//! to the client once, at creation.

use super::{parse_timestamp, parse_uuid};
use crate::auth::{generate_token, hash_token, AuthenticatedUser, Role};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Create a session and return its plain token
pub async fn create_session(
    pool: &SqlitePool,
    user: &AuthenticatedUser,
    expires_at: Option<DateTime<Utc>>,
) -> Result<String> {
    let token = generate_token();

    sqlx::query(
        r#"
        INSERT INTO api_sessions (token_hash, user_id, display_name, role, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(hash_token(&token))
    .bind(user.user_id.to_string())
    .bind(&user.display_name)
    .bind(user.role.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(expires_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(token)
}

/// Resolve a plain token to its user
///
/// Returns `None` for unknown or expired tokens.
pub async fn resolve_session(pool: &SqlitePool, token: &str) -> Result<Option<AuthenticatedUser>> {
    let row = sqlx::query(
        "SELECT user_id, display_name, role, expires_at FROM api_sessions WHERE token_hash = ?",
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expires_at: Option<String> = row.get("expires_at");
    if let Some(expires_at) = expires_at {
        if parse_timestamp("expires_at", &expires_at)? <= Utc::now() {
            return Ok(None);
        }
    }

    let user_id: String = row.get("user_id");
    let role: String = row.get("role");
    Ok(Some(AuthenticatedUser {
        user_id: parse_uuid("user_id", &user_id)?,
        display_name: row.get("display_name"),
        role: role.parse::<Role>()?,
    }))
}

/// Revoke a token; returns whether a session existed
pub async fn revoke_session(pool: &SqlitePool, token: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM api_sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
