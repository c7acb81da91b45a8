//! Database helpers for the identity store.
//!
//! All lookups and mutations against the `users` table live here so handlers
//! stay free of SQL. Queries are instrumented the same way across the crate.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

const IDENTITY_COLUMNS: &str =
    "id, name, email, mobile, password_hash, google_id, is_verified, role, refresh_token";

/// One row of the `users` table, as the auth flows see it.
#[derive(Debug, Clone)]
pub(crate) struct IdentityRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) mobile: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) google_id: Option<String>,
    pub(crate) is_verified: bool,
    pub(crate) role: String,
    pub(crate) refresh_token: Option<String>,
}

impl IdentityRecord {
    fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            mobile: row.get("mobile"),
            password_hash: row.get("password_hash"),
            google_id: row.get("google_id"),
            is_verified: row.get("is_verified"),
            role: row.get("role"),
            refresh_token: row.get("refresh_token"),
        }
    }

    /// Public view of the identity: never includes the password hash or the
    /// refresh token.
    pub(crate) fn profile_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "email": self.email,
            "mobile": self.mobile,
            "isVerified": self.is_verified,
            "role": self.role,
        })
    }
}

/// Fields for a new identity row; role defaults to USER in the schema.
#[derive(Debug)]
pub(crate) struct NewIdentity {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) mobile: Option<String>,
    pub(crate) password_hash: String,
    pub(crate) google_id: Option<String>,
    pub(crate) is_verified: bool,
}

/// Outcome when attempting to create an identity.
#[derive(Debug)]
pub(crate) enum InsertOutcome {
    Created(IdentityRecord),
    Conflict,
}

async fn find_one(pool: &PgPool, query: &str, bind: &str) -> Result<Option<IdentityRecord>> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(bind)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity")?;
    Ok(row.as_ref().map(IdentityRecord::from_row))
}

pub(crate) async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<IdentityRecord>> {
    let query =
        format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    find_one(pool, &query, email).await
}

pub(crate) async fn find_by_mobile(pool: &PgPool, mobile: &str) -> Result<Option<IdentityRecord>> {
    let query =
        format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE mobile = $1 LIMIT 1");
    find_one(pool, &query, mobile).await
}

pub(crate) async fn find_by_refresh_token(
    pool: &PgPool,
    refresh_token: &str,
) -> Result<Option<IdentityRecord>> {
    let query =
        format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE refresh_token = $1 LIMIT 1");
    find_one(pool, &query, refresh_token).await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<IdentityRecord>> {
    let query = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity by id")?;
    Ok(row.as_ref().map(IdentityRecord::from_row))
}

/// Lookup used by federated login: match on provider id first, fall back to
/// the profile email so an existing password account can be linked.
pub(crate) async fn find_by_google_or_email(
    pool: &PgPool,
    google_id: &str,
    email: &str,
) -> Result<Option<IdentityRecord>> {
    let query = format!(
        "SELECT {IDENTITY_COLUMNS} FROM users WHERE google_id = $1 OR email = $2 LIMIT 1"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(google_id)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity for federated login")?;
    Ok(row.as_ref().map(IdentityRecord::from_row))
}

/// Overwrite the single stored refresh token. Passing `None` ends the
/// session; passing a token makes it the only live one for this identity.
pub(crate) async fn set_refresh_token(
    pool: &PgPool,
    id: Uuid,
    refresh_token: Option<&str>,
) -> Result<()> {
    let query = "UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(refresh_token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update refresh token")?;
    Ok(())
}

pub(crate) async fn update_password_hash(pool: &PgPool, id: Uuid, hash: &str) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Attach a provider id to an existing identity and mark it verified.
pub(crate) async fn link_google_id(pool: &PgPool, id: Uuid, google_id: &str) -> Result<()> {
    let query =
        "UPDATE users SET google_id = $2, is_verified = TRUE, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(google_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to link federated identity")?;
    Ok(())
}

pub(crate) async fn insert_identity(pool: &PgPool, new: &NewIdentity) -> Result<InsertOutcome> {
    let query = format!(
        r"
        INSERT INTO users (name, email, mobile, password_hash, google_id, is_verified)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {IDENTITY_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.mobile.as_deref())
        .bind(&new.password_hash)
        .bind(new.google_id.as_deref())
        .bind(new.is_verified)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertOutcome::Created(IdentityRecord::from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert identity"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
    use std::time::Duration;

    fn unreachable_pool() -> PgPool {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("invalid")
            .database("invalid")
            .ssl_mode(PgSslMode::Disable);
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy_with(options)
    }

    fn identity() -> IdentityRecord {
        IdentityRecord {
            id: Uuid::nil(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            mobile: Some("5551234567".to_string()),
            password_hash: Some("hash".to_string()),
            google_id: None,
            is_verified: true,
            role: "USER".to_string(),
            refresh_token: Some("token".to_string()),
        }
    }

    #[test]
    fn profile_json_excludes_credentials() {
        let profile = identity().profile_json();
        assert_eq!(profile["email"], "alice@example.com");
        assert_eq!(profile["role"], "USER");
        assert!(profile.get("password_hash").is_none());
        assert!(profile.get("refresh_token").is_none());
        assert!(profile.get("refreshToken").is_none());
    }

    #[tokio::test]
    async fn find_by_email_errors_on_db_failure() {
        let pool = unreachable_pool();
        let result = find_by_email(&pool, "alice@example.com").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn insert_identity_errors_on_db_failure() {
        let pool = unreachable_pool();
        let new = NewIdentity {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            mobile: None,
            password_hash: "hash".to_string(),
            google_id: None,
            is_verified: false,
        };
        let result = insert_identity(&pool, &new).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn set_refresh_token_errors_on_db_failure() {
        let pool = unreachable_pool();
        let result = set_refresh_token(&pool, Uuid::nil(), Some("token")).await;
        assert!(result.is_err());
    }
}
