//! Authentication middleware
//!
//! Resolves `Authorization: Bearer <token>` (or `?token=` for EventSource
//! clients, which cannot set headers) against `api_sessions` and attaches the
//! caller as `Extension<AuthenticatedUser>`. Role checks happen in handlers.

use axum::{
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use pulse_common::auth::parse_bearer;
use pulse_common::db::sessions::resolve_session;
use serde::Deserialize;
use tracing::debug;

use crate::{error::ApiError, AppState};

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn request_token(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(header::AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(parse_bearer)
            .map(str::to_string);
    }
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Reject requests without a valid session (401)
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let user = resolve_session(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    debug!(user_id = %user.user_id, role = %user.role, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_token_from_header_or_query() {
        let with_header = Request::builder()
            .uri("/api/ai/operations")
            .header(header::AUTHORIZATION, "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_token(&with_header).as_deref(), Some("abc123"));

        let with_query = Request::builder()
            .uri("/api/ai/events?token=xyz&limit=5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_token(&with_query).as_deref(), Some("xyz"));

        let neither = Request::builder()
            .uri("/api/ai/events?token=")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_token(&neither), None);

        let wrong_scheme = Request::builder()
            .uri("/api/ai/events?token=xyz")
            .header(header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_token(&wrong_scheme), None);
    }
}
