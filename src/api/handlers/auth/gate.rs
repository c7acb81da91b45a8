//! Bearer-token gate for protected routes.
//!
//! Check order is cheapest-first: header shape, blacklist membership,
//! signature/expiry, then the identity load. An identity whose stored
//! refresh token is gone has been logged out everywhere and is rejected
//! even though its access token would still verify.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::token::TokenError;

use super::state::AuthState;
use super::storage::find_by_id;
use super::types::{
    CODE_FORBIDDEN, CODE_NO_REFRESH_TOKEN, CODE_TOKEN_EXPIRED, CODE_TOKEN_REVOKED, code_response,
    message_response,
};
use super::utils::{extract_bearer_token, has_authorization_header};

const ALLOWED_ROLES: [&str; 2] = ["ADMIN", "USER"];

/// Authenticated user context attached to the request by the gate.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

/// Middleware enforcing the gate contract for every route it wraps.
pub async fn require_auth(mut request: Request, next: Next) -> Response {
    let (Some(pool), Some(auth_state)) = (
        request.extensions().get::<PgPool>().cloned(),
        request.extensions().get::<Arc<AuthState>>().cloned(),
    ) else {
        error!("Auth gate missing pool or auth state extension");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    };

    let Some(access_token) = extract_bearer_token(request.headers()) else {
        let message = if has_authorization_header(request.headers()) {
            "Unauthorized access. Token must start with 'Bearer '."
        } else {
            "Unauthorized access. No token provided."
        };
        return message_response(StatusCode::UNAUTHORIZED, message);
    };

    // Revocation before cryptography: the blacklist lookup is the cheap check.
    match auth_state.issuer().is_blacklisted(&access_token).await {
        Ok(true) => {
            return code_response(
                StatusCode::UNAUTHORIZED,
                "Unauthorized access. Token has been revoked.",
                CODE_TOKEN_REVOKED,
            );
        }
        Ok(false) => {}
        Err(err) => {
            error!("Blacklist check failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }

    let claims = match auth_state.issuer().verify_access_token(&access_token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return code_response(
                StatusCode::UNAUTHORIZED,
                "Access token expired. Please refresh your token.",
                CODE_TOKEN_EXPIRED,
            );
        }
        Err(_) => {
            return message_response(
                StatusCode::UNAUTHORIZED,
                "Unauthorized access. Invalid token.",
            );
        }
    };

    let identity = match find_by_id(&pool, claims.sub).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return message_response(
                StatusCode::UNAUTHORIZED,
                "Unauthorized access. Invalid token.",
            );
        }
        Err(err) => {
            error!("Gate identity lookup failed: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    if identity.refresh_token.is_none() {
        return code_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized access. User has no refresh token.",
            CODE_NO_REFRESH_TOKEN,
        );
    }
    if !ALLOWED_ROLES.contains(&identity.role.as_str()) {
        return code_response(
            StatusCode::FORBIDDEN,
            "Forbidden access. You do not have the required permissions.",
            CODE_FORBIDDEN,
        );
    }

    request.extensions_mut().insert(Principal {
        user_id: identity.id,
        email: identity.email.clone(),
        role: identity.role.clone(),
    });
    next.run(request).await
}
