//! Federated login through Google's authorization-code flow.
//!
//! `/v1/auth/google` redirects the browser to the provider's consent screen
//! with a single-use `state` value; the callback validates that state,
//! exchanges the code for a profile, links or creates the identity, and
//! redirects back to the frontend with the token pair in the query string.
//! Any failure lands on the frontend's login page with an error marker.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use url::Url;
use utoipa::IntoParams;

use crate::store::TtlStore;

use super::state::AuthState;
use super::storage::{
    IdentityRecord, InsertOutcome, NewIdentity, find_by_google_or_email, insert_identity,
    link_google_id, set_refresh_token,
};
use super::types::message_response;
use super::utils::{hash_password, normalize_email, random_password, random_state_token};

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const STATE_TTL_SECONDS: u64 = 600;

/// Provider credentials and the registered callback.
#[derive(Clone)]
pub struct GoogleConfig {
    client_id: String,
    client_secret: SecretString,
    callback_url: String,
}

impl GoogleConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString, callback_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            callback_url,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }
}

/// Verified profile returned by the provider after the code exchange.
#[derive(Debug, Clone)]
pub struct GoogleProfile {
    pub provider_id: String,
    pub email: String,
    pub name: String,
}

/// Code-for-profile exchange, behind a trait so tests can stub the provider.
#[async_trait]
pub trait GoogleExchange: Send + Sync {
    /// Redeem an authorization code for the user's verified profile.
    ///
    /// # Errors
    /// Returns an error when the provider rejects the code or the profile is
    /// unusable.
    async fn exchange_code(&self, code: &str) -> Result<GoogleProfile>;
}

/// Live provider client speaking OAuth over HTTPS.
pub struct GoogleClient {
    http: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    #[must_use]
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

#[async_trait]
impl GoogleExchange for GoogleClient {
    async fn exchange_code(&self, code: &str) -> Result<GoogleProfile> {
        let token: TokenExchangeResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("redirect_uri", self.config.callback_url()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("token exchange request failed")?
            .error_for_status()
            .context("token exchange rejected")?
            .json()
            .await
            .context("token exchange returned unexpected payload")?;

        let info: UserInfoResponse = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("userinfo request failed")?
            .error_for_status()
            .context("userinfo rejected")?
            .json()
            .await
            .context("userinfo returned unexpected payload")?;

        let email = info
            .email
            .ok_or_else(|| anyhow!("provider profile has no email"))?;
        Ok(GoogleProfile {
            provider_id: info.sub,
            name: info.name.unwrap_or_else(|| email.clone()),
            email,
        })
    }
}

/// Single-use store for the OAuth `state` parameter.
pub struct OauthStateStore {
    store: Arc<dyn TtlStore>,
}

impl OauthStateStore {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    fn key(state: &str) -> String {
        format!("oauth_state:{state}")
    }

    /// Mint and persist a fresh state value for one handshake.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn issue(&self) -> Result<String> {
        let state = random_state_token();
        self.store
            .set(
                &Self::key(&state),
                "1",
                Duration::from_secs(STATE_TTL_SECONDS),
            )
            .await?;
        Ok(state)
    }

    /// Consume a state value; each one validates at most once.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn consume(&self, state: &str) -> Result<bool> {
        self.store.delete(&Self::key(state)).await
    }
}

/// Build the provider consent URL for one handshake.
///
/// # Errors
/// Returns an error if the authorize endpoint cannot be parsed.
pub fn authorize_url(config: &GoogleConfig, state: &str) -> Result<String> {
    let url = Url::parse_with_params(
        AUTHORIZE_ENDPOINT,
        &[
            ("client_id", config.client_id()),
            ("redirect_uri", config.callback_url()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
        ],
    )
    .context("failed to build authorize URL")?;
    Ok(url.to_string())
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct GoogleCallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/auth/google",
    responses(
        (status = 307, description = "Redirect to the provider consent screen"),
        (status = 503, description = "Federated login not configured")
    ),
    tag = "auth"
)]
pub async fn google_login(auth_state: Extension<Arc<AuthState>>) -> Response {
    let Some(google) = auth_state.google() else {
        return message_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Google login is not configured",
        );
    };

    let state = match google.states().issue().await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to issue OAuth state: {err}");
            return message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error starting Google login",
            );
        }
    };

    match authorize_url(google.config(), &state) {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(err) => {
            error!("Failed to build authorize URL: {err}");
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error starting Google login",
            )
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/google/callback",
    params(GoogleCallbackParams),
    responses(
        (status = 307, description = "Redirect to the frontend with tokens, or to the login page on failure"),
        (status = 503, description = "Federated login not configured")
    ),
    tag = "auth"
)]
pub async fn google_callback(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<GoogleCallbackParams>,
) -> Response {
    let Some(google) = auth_state.google() else {
        return message_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Google login is not configured",
        );
    };
    let frontend = auth_state.config().frontend_base_url();

    if params.error.is_some() {
        return failure_redirect(frontend);
    }
    let (Some(code), Some(state)) = (params.code.as_deref(), params.state.as_deref()) else {
        return failure_redirect(frontend);
    };

    match google.states().consume(state).await {
        Ok(true) => {}
        Ok(false) => return failure_redirect(frontend),
        Err(err) => {
            error!("OAuth state check failed: {err}");
            return failure_redirect(frontend);
        }
    }

    let profile = match google.exchange().exchange_code(code).await {
        Ok(profile) => profile,
        Err(err) => {
            error!("Google code exchange failed: {err}");
            return failure_redirect(frontend);
        }
    };

    let identity = match link_or_create_identity(&pool, &profile).await {
        Ok(identity) => identity,
        Err(err) => {
            error!("Failed to resolve federated identity: {err}");
            return failure_redirect(frontend);
        }
    };

    let access_token = match auth_state.issuer().issue_access_token(identity.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue access token for federated login: {err}");
            return failure_redirect(frontend);
        }
    };
    let refresh_token = match auth_state.issuer().issue_refresh_token(identity.id).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue refresh token for federated login: {err}");
            return failure_redirect(frontend);
        }
    };
    if let Err(err) = set_refresh_token(&pool, identity.id, Some(&refresh_token)).await {
        error!("Failed to persist refresh token for federated login: {err}");
        return failure_redirect(frontend);
    }

    match success_url(frontend, &access_token, &refresh_token) {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(err) => {
            error!("Failed to build frontend redirect: {err}");
            failure_redirect(frontend)
        }
    }
}

async fn link_or_create_identity(pool: &PgPool, profile: &GoogleProfile) -> Result<IdentityRecord> {
    let email = normalize_email(&profile.email);
    if let Some(identity) = find_by_google_or_email(pool, &profile.provider_id, &email).await? {
        if identity.google_id.is_none() {
            link_google_id(pool, identity.id, &profile.provider_id).await?;
        }
        return Ok(identity);
    }

    // First federated login: create a verified identity with an unusable
    // random password so password login stays closed until a reset.
    let new_identity = NewIdentity {
        name: profile.name.clone(),
        email,
        mobile: None,
        password_hash: hash_password(&random_password())?,
        google_id: Some(profile.provider_id.clone()),
        is_verified: true,
    };
    match insert_identity(pool, &new_identity).await? {
        InsertOutcome::Created(identity) => Ok(identity),
        InsertOutcome::Conflict => Err(anyhow!("identity creation raced another login")),
    }
}

fn success_url(frontend: &str, access_token: &str, refresh_token: &str) -> Result<String> {
    let base = frontend.trim_end_matches('/');
    let url = Url::parse_with_params(
        &format!("{base}/oauth-callback"),
        &[
            ("accessToken", access_token),
            ("refreshToken", refresh_token),
        ],
    )
    .context("failed to build oauth callback URL")?;
    Ok(url.to_string())
}

fn failure_redirect(frontend: &str) -> Response {
    let base = frontend.trim_end_matches('/');
    Redirect::temporary(&format!("{base}/login?error=auth_failed")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;

    fn config() -> GoogleConfig {
        GoogleConfig::new(
            "client-123".to_string(),
            SecretString::from("secret".to_string()),
            "https://api.rewear.dev/v1/auth/google/callback".to_string(),
        )
    }

    #[test]
    fn authorize_url_carries_client_and_state() -> Result<()> {
        let url = authorize_url(&config(), "state-xyz")?;
        assert!(url.starts_with(AUTHORIZE_ENDPOINT));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
        Ok(())
    }

    #[tokio::test]
    async fn oauth_state_is_single_use() -> Result<()> {
        let states = OauthStateStore::new(Arc::new(MemoryStore::new()));
        let state = states.issue().await?;

        assert!(states.consume(&state).await?);
        assert!(!states.consume(&state).await?);
        assert!(!states.consume("never-issued").await?);
        Ok(())
    }

    #[test]
    fn success_url_places_tokens_in_query() -> Result<()> {
        let url = success_url("https://rewear.dev/", "acc", "ref")?;
        assert_eq!(
            url,
            "https://rewear.dev/oauth-callback?accessToken=acc&refreshToken=ref"
        );
        Ok(())
    }
}
