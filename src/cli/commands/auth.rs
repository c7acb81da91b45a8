use anyhow::{Context, Result};
use clap::{Arg, Command};
use secrecy::SecretString;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("access-token-secret")
                .long("access-token-secret")
                .help("Signing secret for access tokens")
                .env("REWEAR_ACCESS_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("access-token-ttl-seconds")
                .long("access-token-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("REWEAR_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("refresh-token-secret")
                .long("refresh-token-secret")
                .help("Signing secret for refresh tokens, distinct from the access secret")
                .env("REWEAR_REFRESH_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("refresh-token-ttl-seconds")
                .long("refresh-token-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("REWEAR_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password-reset token TTL in seconds")
                .env("REWEAR_RESET_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("One-time code TTL in seconds")
                .env("REWEAR_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub access_token_secret: SecretString,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_secret: SecretString,
    pub refresh_token_ttl_seconds: u64,
    pub reset_token_ttl_seconds: u64,
    pub otp_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required secret is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let access_token_secret = matches
            .get_one::<String>("access-token-secret")
            .cloned()
            .context("missing required argument: --access-token-secret")?;
        let refresh_token_secret = matches
            .get_one::<String>("refresh-token-secret")
            .cloned()
            .context("missing required argument: --refresh-token-secret")?;

        Ok(Self {
            access_token_secret: SecretString::from(access_token_secret),
            access_token_ttl_seconds: matches
                .get_one::<u64>("access-token-ttl-seconds")
                .copied()
                .unwrap_or(900),
            refresh_token_secret: SecretString::from(refresh_token_secret),
            refresh_token_ttl_seconds: matches
                .get_one::<u64>("refresh-token-ttl-seconds")
                .copied()
                .unwrap_or(604_800),
            reset_token_ttl_seconds: matches
                .get_one::<u64>("reset-token-ttl-seconds")
                .copied()
                .unwrap_or(900),
            otp_ttl_seconds: matches
                .get_one::<u64>("otp-ttl-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}
