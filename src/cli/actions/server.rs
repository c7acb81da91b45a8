use crate::api;
use crate::api::handlers::auth::{AuthConfig, GoogleConfig};
use crate::api::outbound::DispatchConfig;
use crate::api::rate_limit::RatePolicy;
use crate::cli::commands::google;
use crate::token::TokenConfig;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub access_token_secret: SecretString,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_secret: SecretString,
    pub refresh_token_ttl_seconds: u64,
    pub reset_token_ttl_seconds: u64,
    pub otp_ttl_seconds: u64,
    pub rate_limit_window_seconds: u64,
    pub auth_rate_limit: i64,
    pub general_rate_limit: i64,
    pub cache_ttl_seconds: u64,
    pub dispatch_max_attempts: u32,
    pub dispatch_backoff_base_seconds: u64,
    pub dispatch_backoff_max_seconds: u64,
    pub google: Option<google::Options>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let token_config = TokenConfig::new(args.access_token_secret, args.refresh_token_secret)
        .with_access_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_reset_ttl_seconds(args.reset_token_ttl_seconds);

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_cache_ttl_seconds(args.cache_ttl_seconds);

    let rate_policy = RatePolicy::new()
        .with_window_seconds(args.rate_limit_window_seconds)
        .with_auth_limit(args.auth_rate_limit)
        .with_general_limit(args.general_rate_limit);

    let dispatch_config = DispatchConfig::new()
        .with_max_attempts(args.dispatch_max_attempts)
        .with_backoff_base_seconds(args.dispatch_backoff_base_seconds)
        .with_backoff_max_seconds(args.dispatch_backoff_max_seconds);

    let google_config = args.google.map(|options| {
        GoogleConfig::new(
            options.client_id,
            options.client_secret,
            options.callback_url,
        )
    });

    api::new(
        args.port,
        args.dsn,
        api::ServerOptions {
            token_config,
            auth_config,
            rate_policy,
            otp_ttl_seconds: args.otp_ttl_seconds,
            dispatch_config,
            google_config,
        },
    )
    .await
}
