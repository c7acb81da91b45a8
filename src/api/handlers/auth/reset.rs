//! Forget/reset password pair.
//!
//! `forgetPassword` mails a link carrying a short-lived signed reset token;
//! `resetPassword` accepts the new password only when that token verifies
//! and its email claim matches the query parameter. Possession of the mailed
//! link is what authorizes the change.

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use url::Url;

use crate::api::cache::USER_CACHE_PREFIX;
use crate::api::outbound;
use crate::token::TokenError;

use super::state::AuthState;
use super::storage::{find_by_email, update_password_hash};
use super::types::{
    ForgetPasswordRequest, ResetPasswordParams, ResetPasswordRequest, message_response,
};
use super::utils::{hash_password, normalize_email};

#[utoipa::path(
    post,
    path = "/v1/auth/forgetPassword",
    request_body = ForgetPasswordRequest,
    responses(
        (status = 200, description = "Reset link dispatched"),
        (status = 400, description = "Missing email"),
        (status = 404, description = "No account for this email"),
        (status = 500, description = "Reset link could not be dispatched")
    ),
    tag = "auth"
)]
pub async fn forget_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgetPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    }

    let identity = match find_by_email(&pool, &email).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(StatusCode::NOT_FOUND, "User not found for this email");
        }
        Err(err) => {
            error!("Forget-password lookup failed: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error in sending forgetPassword mail",
            );
        }
    };

    let reset_token = match auth_state.issuer().issue_reset_token(&identity.email) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue reset token: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error in sending forgetPassword mail",
            );
        }
    };

    let reset_url = match build_reset_url(
        auth_state.config().frontend_base_url(),
        &identity.email,
        &reset_token,
    ) {
        Ok(url) => url,
        Err(err) => {
            error!("Failed to build reset URL: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error in sending forgetPassword mail",
            );
        }
    };

    let message = outbound::reset_password_email(&identity.email, &reset_url);
    match auth_state.dispatcher().submit(message) {
        Ok(_job_id) => message_response(StatusCode::OK, "Mail sent successfully"),
        Err(err) => {
            error!("Failed to enqueue reset mail: {err}");
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error in sending forgetPassword mail",
            )
        }
    }
}

fn build_reset_url(frontend_base_url: &str, email: &str, token: &str) -> anyhow::Result<String> {
    let base = frontend_base_url.trim_end_matches('/');
    let url = Url::parse_with_params(
        &format!("{base}/auth/resetPassword"),
        &[("email", email), ("token", token)],
    )?;
    Ok(url.to_string())
}

#[utoipa::path(
    post,
    path = "/v1/auth/resetPassword",
    params(ResetPasswordParams),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Missing email, token, or new password"),
        (status = 401, description = "Reset token invalid or expired"),
        (status = 404, description = "No account for this email"),
        (status = 500, description = "Password could not be updated")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<ResetPasswordParams>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Response {
    let Some(email) = params.email.as_deref().map(normalize_email).filter(|e| !e.is_empty())
    else {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    };
    let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) else {
        return message_response(StatusCode::BAD_REQUEST, "Reset token is required");
    };
    let new_password = payload
        .and_then(|Json(request)| request.new_password)
        .filter(|password| !password.is_empty());
    let Some(new_password) = new_password else {
        return message_response(StatusCode::BAD_REQUEST, "New password is required");
    };

    // The signed token proves the caller received the reset mail; the email
    // parameter alone is not enough.
    let claims = match auth_state.issuer().verify_reset_token(token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return message_response(
                StatusCode::UNAUTHORIZED,
                "Reset link expired. Please request a new one.",
            );
        }
        Err(_) => {
            return message_response(StatusCode::UNAUTHORIZED, "Invalid reset link");
        }
    };
    if claims.email != email {
        return message_response(StatusCode::UNAUTHORIZED, "Invalid reset link");
    }

    let identity = match find_by_email(&pool, &email).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(StatusCode::NOT_FOUND, "User not found for this email");
        }
        Err(err) => {
            error!("Reset-password lookup failed: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error in updating password",
            );
        }
    };

    let password_hash = match hash_password(&new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error in updating password",
            );
        }
    };

    if let Err(err) = update_password_hash(&pool, identity.id, &password_hash).await {
        error!("Failed to update password: {err}");
        return message_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error in updating password",
        );
    }

    // The credential changed; drop any cached view of this profile.
    let pattern = format!("{USER_CACHE_PREFIX}:/v1/users/{}", identity.id);
    if let Err(err) = auth_state.response_cache().delete_by_pattern(&pattern).await {
        error!("Failed to invalidate cached profile: {err}");
    }

    message_response(StatusCode::OK, "Password updated successfully")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_url_encodes_query_parameters() -> anyhow::Result<()> {
        let url = build_reset_url("https://rewear.dev/", "alice+swap@example.com", "tok en")?;
        assert!(url.starts_with("https://rewear.dev/auth/resetPassword?"));
        assert!(url.contains("email=alice%2Bswap%40example.com"));
        assert!(url.contains("token=tok+en"));
        Ok(())
    }
}
