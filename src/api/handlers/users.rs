//! Authenticated profile reads.
//!
//! Runs behind the auth gate and the response cache: the first read within
//! the cache TTL hits the database, later reads are served from the cache
//! tagged `fromCache: true`. Reset-password invalidates the cached entry.

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::auth::gate::Principal;
use super::auth::storage::find_by_id;
use super::auth::types::message_response;

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "Identity id")
    ),
    responses(
        (status = 200, description = "Profile returned"),
        (status = 401, description = "Missing, revoked, or expired access token"),
        (status = 404, description = "No identity with this id")
    ),
    tag = "users"
)]
pub async fn get_user(
    pool: Extension<PgPool>,
    principal: Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Response {
    tracing::debug!(requested_by = %principal.user_id, "profile read");

    match find_by_id(&pool, id).await {
        Ok(Some(identity)) => (
            StatusCode::OK,
            Json(json!({
                "message": "User fetched successfully",
                "data": identity.profile_json(),
            })),
        )
            .into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Profile lookup failed: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching user")
        }
    }
}
