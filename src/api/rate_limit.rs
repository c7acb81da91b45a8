//! Fixed-window request rate limiting keyed by client address.
//!
//! The counter lives in the shared [`TtlStore`]: the first request in a
//! window stores 1 with the window as TTL, later requests increment without
//! touching the TTL, so the whole window resets at once. The counter key is
//! per client; the limit applied against it differs per route class, with a
//! stricter budget on credential endpoints.

use anyhow::Result;
use axum::{
    Json,
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::store::TtlStore;

const DEFAULT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_AUTH_LIMIT: i64 = 5;
const DEFAULT_GENERAL_LIMIT: i64 = 20;

/// Requests allowed per window for one route class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: i64,
    pub window: Duration,
}

/// Per-route-class budgets sharing one counter per client.
#[derive(Clone, Copy, Debug)]
pub struct RatePolicy {
    auth: RateQuota,
    general: RateQuota,
}

impl RatePolicy {
    #[must_use]
    pub fn new() -> Self {
        let window = Duration::from_secs(DEFAULT_WINDOW_SECONDS);
        Self {
            auth: RateQuota {
                limit: DEFAULT_AUTH_LIMIT,
                window,
            },
            general: RateQuota {
                limit: DEFAULT_GENERAL_LIMIT,
                window,
            },
        }
    }

    #[must_use]
    pub fn with_window_seconds(mut self, seconds: u64) -> Self {
        let window = Duration::from_secs(seconds);
        self.auth.window = window;
        self.general.window = window;
        self
    }

    #[must_use]
    pub fn with_auth_limit(mut self, limit: i64) -> Self {
        self.auth.limit = limit;
        self
    }

    #[must_use]
    pub fn with_general_limit(mut self, limit: i64) -> Self {
        self.general.limit = limit;
        self
    }

    /// Credential endpoints get the strict budget, everything else the
    /// general one.
    #[must_use]
    pub fn quota_for(&self, path: &str) -> RateQuota {
        if path.starts_with("/v1/auth/login/")
            || path == "/v1/auth/forgetPassword"
            || path == "/v1/auth/resetPassword"
        {
            self.auth
        } else {
            self.general
        }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one counter check, surfaced in response headers.
#[derive(Debug)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

pub struct RateLimiter {
    store: Arc<dyn TtlStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    /// Count a request against `client_key` and report whether it fits the
    /// quota. The increment is atomic with respect to concurrent requests
    /// from the same client.
    ///
    /// # Errors
    /// Returns an error if the counter store fails; callers must fail closed.
    pub async fn check_and_increment(
        &self,
        client_key: &str,
        quota: RateQuota,
    ) -> Result<RateLimitOutcome> {
        let key = format!("rate_limit:{client_key}");
        let count = self.store.incr(&key, quota.window).await?;
        // reset_at is approximate: now + window, not the exact bucket boundary.
        let reset_at = Utc::now()
            + chrono::Duration::from_std(quota.window).unwrap_or(chrono::Duration::zero());
        Ok(RateLimitOutcome {
            allowed: count <= quota.limit,
            limit: quota.limit,
            remaining: (quota.limit - count).max(0),
            reset_at,
        })
    }
}

/// Extract a client address for rate limiting from common proxy headers.
#[must_use]
pub fn extract_client_key(headers: &axum::http::HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| "unknown".to_string(), str::to_string)
}

/// Middleware enforcing the policy for every route it wraps.
///
/// Rejections are 429 with a human-readable body; counter failures are 500
/// because quota checks fail closed.
pub async fn enforce(request: Request, next: Next) -> Response {
    let Some(auth_state) = request
        .extensions()
        .get::<Arc<super::handlers::auth::AuthState>>()
        .cloned()
    else {
        error!("Rate limit middleware missing auth state extension");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let client_key = extract_client_key(request.headers());
    let quota = auth_state.rate_policy().quota_for(request.uri().path());

    let outcome = match auth_state
        .rate_limiter()
        .check_and_increment(&client_key, quota)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Rate limit check failed for {client_key}: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": "Internal server error",
                    "status": "error",
                })),
            )
                .into_response();
        }
    };

    if !outcome.allowed {
        debug!("Rate limit exceeded for client {client_key}");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "message": "Rate limit exceeded. Please try again later.",
                "status": "error",
            })),
        )
            .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&outcome.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.reset_at.to_rfc3339()) {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use axum::http::{HeaderMap, HeaderValue};

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn sixth_request_in_window_is_rejected() -> Result<()> {
        let limiter = limiter();
        let quota = RateQuota {
            limit: 5,
            window: Duration::from_secs(60),
        };

        for _ in 0..5 {
            let outcome = limiter.check_and_increment("1.2.3.4", quota).await?;
            assert!(outcome.allowed);
        }
        let outcome = limiter.check_and_increment("1.2.3.4", quota).await?;
        assert!(!outcome.allowed);
        assert_eq!(outcome.remaining, 0);
        Ok(())
    }

    #[tokio::test]
    async fn counter_resets_once_window_elapses() -> Result<()> {
        let limiter = limiter();
        let expired = RateQuota {
            limit: 1,
            window: Duration::ZERO,
        };
        let fresh = RateQuota {
            limit: 1,
            window: Duration::from_secs(60),
        };

        let first = limiter.check_and_increment("1.2.3.4", expired).await?;
        assert!(first.allowed);
        // The zero-length window has already lapsed; the next request starts
        // a new window instead of tripping the limit.
        let second = limiter.check_and_increment("1.2.3.4", fresh).await?;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        Ok(())
    }

    #[tokio::test]
    async fn clients_are_counted_independently() -> Result<()> {
        let limiter = limiter();
        let quota = RateQuota {
            limit: 1,
            window: Duration::from_secs(60),
        };

        assert!(limiter.check_and_increment("a", quota).await?.allowed);
        assert!(!limiter.check_and_increment("a", quota).await?.allowed);
        assert!(limiter.check_and_increment("b", quota).await?.allowed);
        Ok(())
    }

    #[test]
    fn policy_routes_credential_paths_to_auth_quota() {
        let policy = RatePolicy::new()
            .with_auth_limit(5)
            .with_general_limit(20)
            .with_window_seconds(60);

        assert_eq!(policy.quota_for("/v1/auth/login/email-password").limit, 5);
        assert_eq!(policy.quota_for("/v1/auth/forgetPassword").limit, 5);
        assert_eq!(policy.quota_for("/v1/auth/resetPassword").limit, 5);
        assert_eq!(policy.quota_for("/v1/auth/refreshAccessToken").limit, 20);
        assert_eq!(policy.quota_for("/v1/users/42").limit, 20);
    }

    #[test]
    fn extract_client_key_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_key(&headers), "1.2.3.4");
    }

    #[test]
    fn extract_client_key_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_key(&headers), "9.9.9.9");
        assert_eq!(extract_client_key(&HeaderMap::new()), "unknown");
    }
}
