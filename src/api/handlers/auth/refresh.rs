//! Access-token refresh.
//!
//! A refresh token is honored only while three views agree: the identity
//! record still points at it, the outstanding registry still contains it,
//! and its own expiry has not passed. The refresh token itself is not
//! rotated here; only a new access token is minted.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::token::TokenError;

use super::state::AuthState;
use super::storage::find_by_refresh_token;
use super::types::{
    CODE_INVALID_REFRESH_TOKEN, CODE_REFRESH_TOKEN_EXPIRED, RefreshAccessTokenRequest,
    code_response, message_response,
};

#[utoipa::path(
    post,
    path = "/v1/auth/refreshAccessToken",
    request_body = RefreshAccessTokenRequest,
    responses(
        (status = 200, description = "New access token issued"),
        (status = 400, description = "Missing refresh token"),
        (status = 401, description = "Refresh token invalid or expired")
    ),
    tag = "auth"
)]
pub async fn refresh_access_token(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshAccessTokenRequest>>,
) -> Response {
    let refresh_token = payload.and_then(|Json(request)| request.refresh_token);
    let Some(refresh_token) = refresh_token.filter(|token| !token.is_empty()) else {
        return message_response(StatusCode::BAD_REQUEST, "Refresh token is required");
    };

    // The identity record is the source of truth for the active session: a
    // token orphaned by a later login fails here even though it is still in
    // the outstanding registry.
    let identity = match find_by_refresh_token(&pool, &refresh_token).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return code_response(
                StatusCode::UNAUTHORIZED,
                "Invalid refresh token - not found",
                CODE_INVALID_REFRESH_TOKEN,
            );
        }
        Err(err) => {
            error!("Refresh lookup failed: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error refreshing access token",
            );
        }
    };

    match auth_state
        .issuer()
        .is_refresh_token_outstanding(&refresh_token)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return code_response(
                StatusCode::UNAUTHORIZED,
                "Invalid refresh token - not verified",
                CODE_INVALID_REFRESH_TOKEN,
            );
        }
        Err(err) => {
            error!("Refresh registry check failed: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error refreshing access token",
            );
        }
    }

    // Secondary expiry check, tolerant of malformed tokens. A distinct code
    // tells the client to force a re-login instead of retrying.
    if auth_state.issuer().is_expired(&refresh_token) {
        return code_response(
            StatusCode::UNAUTHORIZED,
            "Refresh token expired. Please login again.",
            CODE_REFRESH_TOKEN_EXPIRED,
        );
    }

    // Full verification last: signature plus expiry against the refresh key.
    match auth_state.issuer().verify_refresh_token(&refresh_token).await {
        Ok(_claims) => {}
        Err(TokenError::Expired) => {
            return code_response(
                StatusCode::UNAUTHORIZED,
                "Refresh token expired. Please login again.",
                CODE_REFRESH_TOKEN_EXPIRED,
            );
        }
        Err(err) => {
            error!("Refresh token verification failed: {err}");
            return code_response(
                StatusCode::UNAUTHORIZED,
                "Invalid refresh token",
                CODE_INVALID_REFRESH_TOKEN,
            );
        }
    };

    let access_token = match auth_state.issuer().issue_access_token(identity.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue access token on refresh: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error refreshing access token",
            );
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "message": "Access token refreshed successfully",
            "data": {
                "accessToken": access_token,
            },
        })),
    )
        .into_response()
}
