//! Read-through cache for idempotent GET responses.
//!
//! Keys are `prefix:fullRequestPath` so query parameters participate in the
//! key. Only 2xx GET payloads are stored; cached replies are tagged with
//! `fromCache: true` so clients can tell a hit from live data. Invalidation
//! is explicit: mutating handlers delete by exact key or by prefix pattern.
//! Cache failures never block the underlying request.

use anyhow::{Context, Result};
use axum::{
    Json,
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::store::TtlStore;

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Prefix for cached user-profile reads; reset-password invalidates under it.
pub const USER_CACHE_PREFIX: &str = "users";

pub struct ResponseCache {
    store: Arc<dyn TtlStore>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// Returns an error if the backing store fails or holds non-JSON data.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.store.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt cache entry for {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// # Errors
    /// Returns an error if serialization or the store write fails.
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(value).context("failed to serialize cache entry")?;
        self.store.set(key, &raw, ttl).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        self.store.delete_by_pattern(pattern).await
    }
}

/// Build the cache key for a request path, including any query string.
#[must_use]
pub fn cache_key(prefix: &str, path_and_query: &str) -> String {
    format!("{prefix}:{path_and_query}")
}

/// Middleware caching successful GET payloads for the routes it wraps.
///
/// On a hit the wrapped handler never runs; on a miss the 2xx JSON body's
/// `data` field is stored before the response is returned unchanged.
pub async fn cache_response(request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let Some(auth_state) = request
        .extensions()
        .get::<Arc<super::handlers::auth::AuthState>>()
        .cloned()
    else {
        error!("Cache middleware missing auth state extension");
        return next.run(request).await;
    };

    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
    let key = cache_key(USER_CACHE_PREFIX, &path_and_query);

    match auth_state.response_cache().get(&key).await {
        Ok(Some(data)) => {
            debug!("Cache HIT for key: {key}");
            return (
                StatusCode::OK,
                Json(json!({
                    "message": "Cache HIT: Data retrieved from cache",
                    "data": data,
                    "fromCache": true,
                })),
            )
                .into_response();
        }
        Ok(None) => debug!("Cache MISS for key: {key}"),
        // A broken cache must not block the request.
        Err(err) => error!("Cache lookup failed for key {key}: {err}"),
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to buffer response body for caching: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        if let Some(data) = value.get("data") {
            let ttl = auth_state.config().cache_ttl();
            if let Err(err) = auth_state.response_cache().set(&key, data, ttl).await {
                error!("Failed to store cache entry for key {key}: {err}");
            }
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache() -> ResponseCache {
        ResponseCache::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn set_then_get_returns_payload() -> Result<()> {
        let cache = cache();
        let key = cache_key(USER_CACHE_PREFIX, "/v1/users/42?fields=email");
        let payload = json!({"id": "42", "email": "alice@example.com"});

        cache.set(&key, &payload, HOUR).await?;
        assert_eq!(cache.get(&key).await?, Some(payload));
        Ok(())
    }

    #[tokio::test]
    async fn expired_entries_miss() -> Result<()> {
        let cache = cache();
        cache.set("users:/v1/users/1", &json!(1), Duration::ZERO).await?;
        assert_eq!(cache.get("users:/v1/users/1").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_by_pattern_forces_next_read_to_miss() -> Result<()> {
        let cache = cache();
        cache.set("users:/v1/users/1", &json!(1), HOUR).await?;
        cache.set("users:/v1/users/2", &json!(2), HOUR).await?;

        assert_eq!(cache.get("users:/v1/users/1").await?, Some(json!(1)));
        let removed = cache.delete_by_pattern("users:*").await?;
        assert_eq!(removed, 2);
        assert_eq!(cache.get("users:/v1/users/1").await?, None);
        assert_eq!(cache.get("users:/v1/users/2").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_exact_key_only() -> Result<()> {
        let cache = cache();
        cache.set("users:/v1/users/1", &json!(1), HOUR).await?;
        cache.set("users:/v1/users/10", &json!(10), HOUR).await?;

        assert!(cache.delete("users:/v1/users/1").await?);
        assert_eq!(cache.get("users:/v1/users/1").await?, None);
        assert_eq!(cache.get("users:/v1/users/10").await?, Some(json!(10)));
        Ok(())
    }

    #[test]
    fn cache_key_includes_query_parameters() {
        assert_eq!(
            cache_key("users", "/v1/users/42?full=true"),
            "users:/v1/users/42?full=true"
        );
    }
}
