use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

use crate::store::MemoryStore;
use crate::token::{TokenConfig, TokenIssuer};

pub mod cache;
pub mod handlers;
pub mod outbound;
pub mod rate_limit;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

pub use crate::{APP_USER_AGENT, GIT_COMMIT_HASH};

use handlers::auth::{
    AuthConfig, AuthState, GoogleClient, GoogleConfig, GoogleState, OauthStateStore, OtpStore,
};
use outbound::{DispatchConfig, LogMailSender, LogSmsSender, spawn_dispatch_worker};
use rate_limit::{RateLimiter, RatePolicy};

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything `new` needs beyond the listen port and the database DSN.
pub struct ServerOptions {
    pub token_config: TokenConfig,
    pub auth_config: AuthConfig,
    pub rate_policy: RatePolicy,
    pub otp_ttl_seconds: u64,
    pub dispatch_config: DispatchConfig,
    pub google_config: Option<GoogleConfig>,
}

/// Assemble the shared auth state from one backing store.
#[must_use]
pub fn build_auth_state(options: ServerOptions) -> Arc<AuthState> {
    let store = Arc::new(MemoryStore::new());
    let issuer = TokenIssuer::new(options.token_config, store.clone());
    let otp = OtpStore::new(
        store.clone(),
        Duration::from_secs(options.otp_ttl_seconds),
    );
    let rate_limiter = RateLimiter::new(store.clone());
    let response_cache = cache::ResponseCache::new(store.clone());

    let (dispatcher, _worker) = spawn_dispatch_worker(
        Arc::new(LogMailSender),
        Arc::new(LogSmsSender),
        options.dispatch_config,
    );

    let google = options.google_config.map(|config| {
        GoogleState::new(
            config.clone(),
            Arc::new(GoogleClient::new(config)),
            OauthStateStore::new(store.clone()),
        )
    });

    Arc::new(AuthState::new(
        options.auth_config,
        issuer,
        otp,
        rate_limiter,
        options.rate_policy,
        response_cache,
        dispatcher,
        google,
    ))
}

/// Wire the router, cross-cutting layers, and shared state into an app.
///
/// # Errors
/// Returns an error if the frontend origin for CORS cannot be parsed.
pub fn app(pool: PgPool, auth_state: Arc<AuthState>) -> Result<Router> {
    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let (router, _openapi) = router().split_for_parts();
    // The rate limiter runs innermost so request extensions are in place;
    // everything it wraps shares one counter per client.
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(auth_state))
            .layer(Extension(pool))
            .layer(middleware::from_fn(rate_limit::enforce)),
    );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, options: ServerOptions) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let auth_state = build_auth_state(options);
    let app = app(pool, auth_state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() -> Result<()> {
        let origin = frontend_origin("https://rewear.dev/app/")?;
        assert_eq!(origin, HeaderValue::from_static("https://rewear.dev"));

        let origin = frontend_origin("http://localhost:5173")?;
        assert_eq!(origin, HeaderValue::from_static("http://localhost:5173"));
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
