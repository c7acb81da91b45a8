use anyhow::Result;
use clap::{Arg, Command};
use secrecy::SecretString;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("google-client-id")
                .long("google-client-id")
                .help("Google OAuth client id")
                .env("REWEAR_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new("google-client-secret")
                .long("google-client-secret")
                .help("Google OAuth client secret")
                .env("REWEAR_GOOGLE_CLIENT_SECRET"),
        )
        .arg(
            Arg::new("google-callback-url")
                .long("google-callback-url")
                .help("Registered OAuth callback URL for this service")
                .env("REWEAR_GOOGLE_CALLBACK_URL"),
        )
}

/// Present only when all three provider values are configured; federated
/// login stays disabled otherwise.
#[derive(Debug)]
pub struct Options {
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
}

impl Options {
    /// # Errors
    /// Infallible today; kept fallible for parity with the other option sets.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Option<Self>> {
        let client_id = matches.get_one::<String>("google-client-id").cloned();
        let client_secret = matches.get_one::<String>("google-client-secret").cloned();
        let callback_url = matches.get_one::<String>("google-callback-url").cloned();

        Ok(
            match (client_id, client_secret, callback_url) {
                (Some(client_id), Some(client_secret), Some(callback_url)) => Some(Self {
                    client_id,
                    client_secret: SecretString::from(client_secret),
                    callback_url,
                }),
                _ => None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    fn command() -> Command {
        with_args(Command::new("test"))
    }

    #[test]
    fn parse_returns_none_when_partial() -> Result<()> {
        temp_env::with_vars(
            [
                ("REWEAR_GOOGLE_CLIENT_ID", None::<&str>),
                ("REWEAR_GOOGLE_CLIENT_SECRET", None::<&str>),
                ("REWEAR_GOOGLE_CALLBACK_URL", None::<&str>),
            ],
            || -> Result<()> {
                let matches =
                    command().get_matches_from(vec!["test", "--google-client-id", "id"]);
                assert!(Options::parse(&matches)?.is_none());
                Ok(())
            },
        )
    }

    #[test]
    fn parse_returns_options_when_complete() -> Result<()> {
        let matches = command().get_matches_from(vec![
            "test",
            "--google-client-id",
            "id",
            "--google-client-secret",
            "secret",
            "--google-callback-url",
            "https://api.rewear.dev/v1/auth/google/callback",
        ]);
        let options = Options::parse(&matches)?.expect("options");
        assert_eq!(options.client_id, "id");
        assert_eq!(
            options.callback_url,
            "https://api.rewear.dev/v1/auth/google/callback"
        );
        Ok(())
    }
}
