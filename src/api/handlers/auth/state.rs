//! Auth configuration and shared request state.

use std::sync::Arc;
use std::time::Duration;

use crate::api::cache::{DEFAULT_CACHE_TTL_SECONDS, ResponseCache};
use crate::api::outbound::Dispatcher;
use crate::api::rate_limit::{RateLimiter, RatePolicy};
use crate::token::TokenIssuer;

use super::google::{GoogleConfig, GoogleExchange, OauthStateStore};
use super::otp::OtpStore;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    cache_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.cache_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

/// Federated-login wiring: provider credentials, the code-exchange client,
/// and the single-use `state` parameter store.
pub struct GoogleState {
    config: GoogleConfig,
    exchange: Arc<dyn GoogleExchange>,
    states: OauthStateStore,
}

impl GoogleState {
    #[must_use]
    pub fn new(
        config: GoogleConfig,
        exchange: Arc<dyn GoogleExchange>,
        states: OauthStateStore,
    ) -> Self {
        Self {
            config,
            exchange,
            states,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    pub(super) fn exchange(&self) -> &dyn GoogleExchange {
        self.exchange.as_ref()
    }

    pub(super) fn states(&self) -> &OauthStateStore {
        &self.states
    }
}

/// Everything the auth handlers share across requests.
pub struct AuthState {
    config: AuthConfig,
    issuer: TokenIssuer,
    otp: OtpStore,
    rate_limiter: RateLimiter,
    rate_policy: RatePolicy,
    cache: ResponseCache,
    dispatcher: Dispatcher,
    google: Option<GoogleState>,
}

impl AuthState {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AuthConfig,
        issuer: TokenIssuer,
        otp: OtpStore,
        rate_limiter: RateLimiter,
        rate_policy: RatePolicy,
        cache: ResponseCache,
        dispatcher: Dispatcher,
        google: Option<GoogleState>,
    ) -> Self {
        Self {
            config,
            issuer,
            otp,
            rate_limiter,
            rate_policy,
            cache,
            dispatcher,
            google,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn otp(&self) -> &OtpStore {
        &self.otp
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn rate_policy(&self) -> &RatePolicy {
        &self.rate_policy
    }

    #[must_use]
    pub fn response_cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn google(&self) -> Option<&GoogleState> {
        self.google.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://rewear.dev".to_string());
        assert_eq!(config.frontend_base_url(), "https://rewear.dev");
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));

        let config = config.with_cache_ttl_seconds(120);
        assert_eq!(config.cache_ttl(), Duration::from_secs(120));
    }
}
