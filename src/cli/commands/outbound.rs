use anyhow::Result;
use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("dispatch-max-attempts")
                .long("dispatch-max-attempts")
                .help("Max delivery attempts before an outbound message is dropped")
                .env("REWEAR_DISPATCH_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("dispatch-backoff-base-seconds")
                .long("dispatch-backoff-base-seconds")
                .help("Base delay for outbound delivery retry backoff")
                .env("REWEAR_DISPATCH_BACKOFF_BASE_SECONDS")
                .default_value("2")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("dispatch-backoff-max-seconds")
                .long("dispatch-backoff-max-seconds")
                .help("Max delay for outbound delivery retry backoff")
                .env("REWEAR_DISPATCH_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// # Errors
    /// Infallible today; kept fallible for parity with the other option sets.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            max_attempts: matches
                .get_one::<u32>("dispatch-max-attempts")
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>("dispatch-backoff-base-seconds")
                .copied()
                .unwrap_or(2),
            backoff_max_seconds: matches
                .get_one::<u64>("dispatch-backoff-max-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}
