//! Account registration.

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

use crate::api::outbound;

use super::state::AuthState;
use super::storage::{InsertOutcome, NewIdentity, insert_identity};
use super::types::{RegisterRequest, message_response};
use super::utils::{hash_password, normalize_email, valid_email, valid_mobile};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, welcome mail enqueued"),
        (status = 400, description = "Validation failed or email already exists"),
        (status = 500, description = "Account could not be created")
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return message_response(
            StatusCode::BAD_REQUEST,
            "Name, Email and Password are required",
        );
    };

    let name = request.name.trim().to_string();
    let email = normalize_email(&request.email);
    if name.is_empty() || email.is_empty() || request.password.is_empty() {
        return message_response(
            StatusCode::BAD_REQUEST,
            "Name, Email and Password are required",
        );
    }
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "Invalid email");
    }
    let mobile = request
        .mobile
        .as_deref()
        .map(str::trim)
        .filter(|mobile| !mobile.is_empty())
        .map(str::to_string);
    if let Some(mobile) = mobile.as_deref() {
        if !valid_mobile(mobile) {
            return message_response(StatusCode::BAD_REQUEST, "Invalid mobile number");
        }
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password during registration: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error registering user");
        }
    };

    let new_identity = NewIdentity {
        name,
        email,
        mobile,
        password_hash,
        google_id: None,
        is_verified: false,
    };

    let identity = match insert_identity(&pool, &new_identity).await {
        Ok(InsertOutcome::Created(identity)) => identity,
        Ok(InsertOutcome::Conflict) => {
            return message_response(StatusCode::BAD_REQUEST, "Email already exists");
        }
        Err(err) => {
            error!("Failed to insert identity: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error registering user");
        }
    };

    if let Err(err) = auth_state
        .dispatcher()
        .submit(outbound::welcome_email(&identity.email))
    {
        error!("Failed to enqueue welcome mail: {err}");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error in sending mail");
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "message": "User Registered Successfully",
            "data": identity.profile_json(),
        })),
    )
        .into_response()
}
