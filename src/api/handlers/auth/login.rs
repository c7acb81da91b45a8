//! Password login endpoints.
//!
//! Email and mobile variants differ only in how the identity is looked up,
//! so both feed a shared credential check and the common token-issuance
//! tail that every login flow (password, OTP, federated) converges on.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::Response,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::storage::{IdentityRecord, find_by_email, find_by_mobile, set_refresh_token};
use super::types::{
    EmailPasswordLoginRequest, MobilePasswordLoginRequest, TokenPair, message_response,
    tokens_response,
};
use super::utils::{normalize_email, verify_password};

/// Which identifier a password login flow keys on.
#[derive(Debug)]
pub(super) enum LoginKey {
    Email(String),
    Mobile(String),
}

impl LoginKey {
    async fn lookup(&self, pool: &PgPool) -> anyhow::Result<Option<IdentityRecord>> {
        match self {
            Self::Email(email) => find_by_email(pool, email).await,
            Self::Mobile(mobile) => find_by_mobile(pool, mobile).await,
        }
    }

    fn not_found_message(&self) -> &'static str {
        match self {
            Self::Email(_) => "User not found",
            Self::Mobile(_) => "User not found with this mobile number",
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            Self::Email(_) => "Login successful with Email + Password",
            Self::Mobile(_) => "Login successful with Mobile + Password",
        }
    }
}

/// Mint the token pair for a verified identity and persist the refresh token
/// as the identity's single live session. The overwrite is what invalidates
/// any previously issued refresh token.
pub(super) async fn issue_login_tokens(
    pool: &PgPool,
    auth_state: &AuthState,
    identity: &IdentityRecord,
    message: &str,
) -> Response {
    let access_token = match auth_state.issuer().issue_access_token(identity.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue access token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error issuing tokens");
        }
    };
    let refresh_token = match auth_state.issuer().issue_refresh_token(identity.id).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue refresh token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error issuing tokens");
        }
    };

    if let Err(err) = set_refresh_token(pool, identity.id, Some(&refresh_token)).await {
        error!("Failed to persist refresh token: {err}");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error persisting session");
    }

    tokens_response(
        message,
        &TokenPair {
            access_token,
            refresh_token,
        },
    )
}

async fn password_login(
    pool: &PgPool,
    auth_state: &AuthState,
    key: LoginKey,
    password: &str,
) -> Response {
    let identity = match key.lookup(pool).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return message_response(StatusCode::NOT_FOUND, key.not_found_message()),
        Err(err) => {
            error!("Login lookup failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error during login");
        }
    };

    // Pure-federated identities have no hash; they fail the same way a wrong
    // password does so the response does not leak account type.
    let matches = identity
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(password, hash));
    if !matches {
        return message_response(StatusCode::UNAUTHORIZED, "Invalid Credentials!");
    }

    issue_login_tokens(pool, auth_state, &identity, key.success_message()).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/email-password",
    request_body = EmailPasswordLoginRequest,
    responses(
        (status = 200, description = "Login succeeded, tokens returned"),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Password mismatch"),
        (status = 404, description = "No account for this email")
    ),
    tag = "auth"
)]
pub async fn login_email_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EmailPasswordLoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Email and Password are required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Email and Password are required");
    }

    password_login(&pool, &auth_state, LoginKey::Email(email), &request.password).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/mobile-password",
    request_body = MobilePasswordLoginRequest,
    responses(
        (status = 200, description = "Login succeeded, tokens returned"),
        (status = 400, description = "Missing mobile number or password"),
        (status = 401, description = "Password mismatch"),
        (status = 404, description = "No account for this mobile number")
    ),
    tag = "auth"
)]
pub async fn login_mobile_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MobilePasswordLoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Mobile and Password are required");
    };
    let mobile = request.mobile.trim().to_string();
    if mobile.is_empty() || request.password.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Mobile and Password are required");
    }

    password_login(
        &pool,
        &auth_state,
        LoginKey::Mobile(mobile),
        &request.password,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_key_messages_match_flow() {
        let email = LoginKey::Email("a@example.com".to_string());
        assert_eq!(email.not_found_message(), "User not found");
        assert_eq!(email.success_message(), "Login successful with Email + Password");

        let mobile = LoginKey::Mobile("5551234567".to_string());
        assert_eq!(
            mobile.not_found_message(),
            "User not found with this mobile number"
        );
        assert_eq!(
            mobile.success_message(),
            "Login successful with Mobile + Password"
        );
    }
}
