//! Logout: blacklist the presented access token and end the session.
//!
//! The access token (bearer header) and the refresh token (body) are both
//! optional, but at least one must be present. Whichever identity they
//! resolve to gets its stored refresh token cleared, ending the single
//! active session.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::storage::{find_by_id, find_by_refresh_token, set_refresh_token};
use super::types::{LogoutRequest, message_response};
use super::utils::extract_bearer_token;

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session ended"),
        (status = 400, description = "Neither token supplied"),
        (status = 404, description = "No identity matches the supplied token"),
        (status = 500, description = "Logout could not be completed")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> Response {
    let access_token = extract_bearer_token(&headers);
    let refresh_token = payload
        .and_then(|Json(request)| request.refresh_token)
        .filter(|token| !token.is_empty());

    match (access_token, refresh_token) {
        (Some(access_token), refresh_token) => {
            // Blacklisting is idempotent: logging out twice is not an error.
            if let Err(err) = auth_state.issuer().blacklist_access_token(&access_token).await {
                error!("Failed to blacklist access token: {err}");
                return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during logout");
            }

            if let Some(refresh_token) = refresh_token {
                clear_session_by_refresh_token(&pool, &refresh_token).await
            } else {
                clear_session_by_access_token(&pool, &auth_state, &access_token).await
            }
        }
        (None, Some(refresh_token)) => clear_session_by_refresh_token(&pool, &refresh_token).await,
        (None, None) => message_response(
            StatusCode::BAD_REQUEST,
            "accessToken or refreshToken is required for logout",
        ),
    }
}

async fn clear_session_by_refresh_token(pool: &PgPool, refresh_token: &str) -> Response {
    match find_by_refresh_token(pool, refresh_token).await {
        Ok(Some(identity)) => {
            if let Err(err) = set_refresh_token(pool, identity.id, None).await {
                error!("Failed to clear refresh token: {err}");
                return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during logout");
            }
            message_response(StatusCode::OK, "Logout successful")
        }
        Ok(None) => message_response(
            StatusCode::NOT_FOUND,
            "User not found for the provided refreshToken",
        ),
        Err(err) => {
            error!("Logout lookup failed: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during logout")
        }
    }
}

async fn clear_session_by_access_token(
    pool: &PgPool,
    auth_state: &AuthState,
    access_token: &str,
) -> Response {
    // No refresh token supplied: derive the identity from the access token
    // so the stored session still gets cleared.
    let claims = match auth_state.issuer().verify_access_token(access_token) {
        Ok(claims) => claims,
        Err(err) => {
            error!("Logout could not decode access token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during logout");
        }
    };

    match find_by_id(pool, claims.sub).await {
        Ok(Some(identity)) => {
            if let Err(err) = set_refresh_token(pool, identity.id, None).await {
                error!("Failed to clear refresh token: {err}");
                return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during logout");
            }
            message_response(StatusCode::OK, "Logout successful")
        }
        Ok(None) => message_response(
            StatusCode::NOT_FOUND,
            "User not found for the provided accessToken",
        ),
        Err(err) => {
            error!("Logout lookup failed: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during logout")
        }
    }
}
