use anyhow::Result;
use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("rate-limit-window-seconds")
                .long("rate-limit-window-seconds")
                .help("Fixed rate-limit window in seconds")
                .env("REWEAR_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("auth-rate-limit")
                .long("auth-rate-limit")
                .help("Requests per window allowed on credential endpoints")
                .env("REWEAR_AUTH_RATE_LIMIT")
                .default_value("5")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("general-rate-limit")
                .long("general-rate-limit")
                .help("Requests per window allowed on remaining endpoints")
                .env("REWEAR_GENERAL_RATE_LIMIT")
                .default_value("20")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("cache-ttl-seconds")
                .long("cache-ttl-seconds")
                .help("Response cache TTL in seconds")
                .env("REWEAR_CACHE_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub rate_limit_window_seconds: u64,
    pub auth_rate_limit: i64,
    pub general_rate_limit: i64,
    pub cache_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Infallible today; kept fallible for parity with the other option sets.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            rate_limit_window_seconds: matches
                .get_one::<u64>("rate-limit-window-seconds")
                .copied()
                .unwrap_or(60),
            auth_rate_limit: matches
                .get_one::<i64>("auth-rate-limit")
                .copied()
                .unwrap_or(5),
            general_rate_limit: matches
                .get_one::<i64>("general-rate-limit")
                .copied()
                .unwrap_or(20),
            cache_ttl_seconds: matches
                .get_one::<u64>("cache-ttl-seconds")
                .copied()
                .unwrap_or(3600),
        })
    }
}
