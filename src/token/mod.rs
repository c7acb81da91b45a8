//! Token issuance, verification, and revocation.
//!
//! Access and refresh tokens are signed with distinct secrets so compromise
//! of one cannot forge the other. Revocation state lives in two registries
//! behind the shared [`TtlStore`]: the outstanding set of refresh tokens and
//! the blacklist of logged-out access tokens. Verification always performs
//! the cheap membership lookup before any signature work.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::store::TtlStore;

const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: u64 = 15 * 60;

const OUTSTANDING_PREFIX: &str = "refresh_token";
const BLACKLIST_PREFIX: &str = "blacklisted_token";

/// Claims carried by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by password-reset tokens mailed to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub email: String,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug)]
pub enum TokenError {
    /// Signature was valid but the token is past its expiry.
    Expired,
    /// Signature, structure, or claims did not check out.
    Invalid,
    /// Refresh token absent from the outstanding registry.
    NotOutstanding,
    /// Refresh token was not found when asked to invalidate it.
    NotFound,
    /// The backing registry store failed; auth checks fail closed.
    Registry(anyhow::Error),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "token expired"),
            Self::Invalid => write!(f, "invalid token"),
            Self::NotOutstanding => write!(f, "refresh token not outstanding"),
            Self::NotFound => write!(f, "refresh token not found"),
            Self::Registry(err) => write!(f, "token registry failure: {err}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Signing secrets and lifetimes for the issuer.
#[derive(Clone)]
pub struct TokenConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
            reset_ttl: Duration::from_secs(DEFAULT_RESET_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: u64) -> Self {
        self.reset_ttl = Duration::from_secs(seconds);
        self
    }
}

/// `add`/`contains`/`remove` view over the shared store, scoped by prefix.
///
/// Entries expire with the TTL of the tokens they track, so the registries
/// never outgrow the set of tokens that could still verify.
struct Registry {
    store: Arc<dyn TtlStore>,
    prefix: &'static str,
    ttl: Duration,
}

impl Registry {
    fn key(&self, token: &str) -> String {
        format!("{}:{token}", self.prefix)
    }

    async fn add(&self, token: &str) -> Result<()> {
        self.store.set(&self.key(token), "1", self.ttl).await
    }

    async fn contains(&self, token: &str) -> Result<bool> {
        self.store.contains(&self.key(token)).await
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        self.store.delete(&self.key(token)).await
    }
}

/// Signs and verifies the three token kinds and owns both revocation
/// registries.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    reset_ttl: Duration,
    outstanding: Registry,
    blacklist: Registry,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: TokenConfig, store: Arc<dyn TtlStore>) -> Self {
        let access_secret = config.access_secret.expose_secret().as_bytes();
        let refresh_secret = config.refresh_secret.expose_secret().as_bytes();
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl: config.access_ttl,
            reset_ttl: config.reset_ttl,
            outstanding: Registry {
                store: store.clone(),
                prefix: OUTSTANDING_PREFIX,
                ttl: config.refresh_ttl,
            },
            blacklist: Registry {
                store,
                prefix: BLACKLIST_PREFIX,
                ttl: config.access_ttl,
            },
        }
    }

    fn claims(user_id: Uuid, ttl: Duration) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: user_id,
            iat: now,
            exp: now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    fn strict_validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }

    /// Sign a short-lived access token. No side effects beyond signing.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String> {
        let claims = Self::claims(user_id, self.access_ttl);
        encode(&Header::default(), &claims, &self.access_encoding)
            .context("failed to sign access token")
    }

    /// Sign a long-lived refresh token and record it in the outstanding
    /// registry.
    ///
    /// # Errors
    /// Returns an error if signing or the registry write fails.
    pub async fn issue_refresh_token(&self, user_id: Uuid) -> Result<String> {
        let claims = Self::claims(user_id, self.outstanding.ttl);
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)
            .context("failed to sign refresh token")?;
        self.outstanding.add(&token).await?;
        Ok(token)
    }

    /// Verify signature and expiry of an access token.
    ///
    /// # Errors
    /// [`TokenError::Expired`] past expiry, [`TokenError::Invalid`] otherwise.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.access_decoding, &Self::strict_validation())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Verify a refresh token: outstanding-registry membership first (cheap
    /// rejection under abuse), then signature and expiry.
    ///
    /// # Errors
    /// [`TokenError::NotOutstanding`] when absent from the registry, then the
    /// same failure modes as access verification.
    pub async fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        if !self
            .outstanding
            .contains(token)
            .await
            .map_err(TokenError::Registry)?
        {
            return Err(TokenError::NotOutstanding);
        }
        decode::<Claims>(token, &self.refresh_decoding, &Self::strict_validation())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Membership probe used by the refresh flow before any decoding.
    ///
    /// # Errors
    /// Returns an error if the registry store fails.
    pub async fn is_refresh_token_outstanding(&self, token: &str) -> Result<bool> {
        self.outstanding.contains(token).await
    }

    /// Decode-only expiry check, tolerant of malformed input: anything that
    /// cannot be decoded is reported as expired rather than an error.
    #[must_use]
    pub fn is_expired(&self, token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        match decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation) {
            Ok(data) => Utc::now().timestamp() > data.claims.exp,
            Err(_) => true,
        }
    }

    /// Remove a refresh token from the outstanding registry.
    ///
    /// # Errors
    /// [`TokenError::NotFound`] when the token was not outstanding.
    pub async fn invalidate_refresh_token(&self, token: &str) -> Result<(), TokenError> {
        if self
            .outstanding
            .remove(token)
            .await
            .map_err(TokenError::Registry)?
        {
            Ok(())
        } else {
            Err(TokenError::NotFound)
        }
    }

    /// Add an access token to the blacklist. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the registry write fails.
    pub async fn blacklist_access_token(&self, token: &str) -> Result<()> {
        self.blacklist.add(token).await
    }

    /// # Errors
    /// Returns an error if the registry store fails.
    pub async fn is_blacklisted(&self, token: &str) -> Result<bool> {
        self.blacklist.contains(token).await
    }

    /// Sign a short-lived reset token proving possession of the reset email.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_reset_token(&self, email: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = ResetClaims {
            email: email.to_string(),
            purpose: "reset".to_string(),
            iat: now,
            exp: now + i64::try_from(self.reset_ttl.as_secs()).unwrap_or(i64::MAX),
        };
        encode(&Header::default(), &claims, &self.access_encoding)
            .context("failed to sign reset token")
    }

    /// Verify a reset token and return its claims.
    ///
    /// # Errors
    /// [`TokenError::Expired`] past expiry, [`TokenError::Invalid`] for bad
    /// signatures or a claim set that is not a reset grant.
    pub fn verify_reset_token(&self, token: &str) -> Result<ResetClaims, TokenError> {
        let claims = decode::<ResetClaims>(token, &self.access_decoding, &Self::strict_validation())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;
        if claims.purpose == "reset" {
            Ok(claims)
        } else {
            Err(TokenError::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;

    fn issuer() -> TokenIssuer {
        let config = TokenConfig::new(
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
        );
        TokenIssuer::new(config, Arc::new(MemoryStore::new()))
    }

    fn issuer_with(config: TokenConfig) -> TokenIssuer {
        TokenIssuer::new(config, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn access_token_round_trips() -> Result<()> {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.issue_access_token(user_id)?;
        let claims = issuer
            .verify_access_token(&token)
            .map_err(anyhow::Error::new)?;
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
        Ok(())
    }

    #[test]
    fn access_token_rejected_with_wrong_secret() -> Result<()> {
        let issuer = issuer();
        let other = issuer_with(TokenConfig::new(
            SecretString::from("different".to_string()),
            SecretString::from("refresh-secret".to_string()),
        ));
        let token = issuer.issue_access_token(Uuid::new_v4())?;
        assert!(matches!(
            other.verify_access_token(&token),
            Err(TokenError::Invalid)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_secret_does_not_verify_access_tokens() -> Result<()> {
        let issuer = issuer();
        let token = issuer.issue_access_token(Uuid::new_v4())?;
        // The refresh path must not accept tokens minted with the access key.
        let verified = issuer.verify_refresh_token(&token).await;
        assert!(matches!(verified, Err(TokenError::NotOutstanding)));
        Ok(())
    }

    fn expired_token(secret: &str, user_id: Uuid) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now - 120,
            exp: now - 60,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .context("sign expired test token")
    }

    #[test]
    fn expired_access_token_reports_expired() -> Result<()> {
        let issuer = issuer();
        let token = expired_token("access-secret", Uuid::new_v4())?;
        assert!(matches!(
            issuer.verify_access_token(&token),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn expired_refresh_token_reports_expired_when_outstanding() -> Result<()> {
        let issuer = issuer();
        let token = expired_token("refresh-secret", Uuid::new_v4())?;
        issuer.outstanding.add(&token).await?;
        assert!(matches!(
            issuer.verify_refresh_token(&token).await,
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_token_lifecycle() -> Result<()> {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.issue_refresh_token(user_id).await?;

        assert!(issuer.is_refresh_token_outstanding(&token).await?);
        let claims = issuer
            .verify_refresh_token(&token)
            .await
            .map_err(anyhow::Error::new)?;
        assert_eq!(claims.sub, user_id);

        issuer
            .invalidate_refresh_token(&token)
            .await
            .map_err(anyhow::Error::new)?;
        assert!(matches!(
            issuer.verify_refresh_token(&token).await,
            Err(TokenError::NotOutstanding)
        ));
        assert!(matches!(
            issuer.invalidate_refresh_token(&token).await,
            Err(TokenError::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn blacklist_is_idempotent() -> Result<()> {
        let issuer = issuer();
        let token = issuer.issue_access_token(Uuid::new_v4())?;

        assert!(!issuer.is_blacklisted(&token).await?);
        issuer.blacklist_access_token(&token).await?;
        issuer.blacklist_access_token(&token).await?;
        assert!(issuer.is_blacklisted(&token).await?);
        Ok(())
    }

    #[test]
    fn is_expired_tolerates_malformed_tokens() {
        let issuer = issuer();
        assert!(issuer.is_expired("not-a-token"));
        assert!(issuer.is_expired(""));
    }

    #[test]
    fn is_expired_distinguishes_live_from_past_expiry() -> Result<()> {
        let issuer = issuer();
        let live = issuer.issue_access_token(Uuid::new_v4())?;
        assert!(!issuer.is_expired(&live));

        // Decode-only: no signature check, so any secret works here.
        let stale = expired_token("unrelated-secret", Uuid::new_v4())?;
        assert!(issuer.is_expired(&stale));
        Ok(())
    }

    #[test]
    fn reset_token_round_trips_and_checks_purpose() -> Result<()> {
        let issuer = issuer();
        let token = issuer.issue_reset_token("alice@example.com")?;
        let claims = issuer
            .verify_reset_token(&token)
            .map_err(anyhow::Error::new)?;
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.purpose, "reset");

        // Access tokens carry a different claim set and must not pass.
        let access = issuer.issue_access_token(Uuid::new_v4())?;
        assert!(matches!(
            issuer.verify_reset_token(&access),
            Err(TokenError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn expired_reset_token_reports_expired() -> Result<()> {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let claims = ResetClaims {
            email: "alice@example.com".to_string(),
            purpose: "reset".to_string(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )?;
        assert!(matches!(
            issuer.verify_reset_token(&token),
            Err(TokenError::Expired)
        ));
        Ok(())
    }
}
