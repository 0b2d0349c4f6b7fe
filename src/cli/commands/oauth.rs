use anyhow::Result;
use clap::{Arg, Command};

/// Per-provider OAuth client credentials. A provider is enabled only when
/// both its client id and secret are configured.
#[derive(Debug)]
pub struct Options {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
}

impl Options {
    /// # Errors
    /// Currently infallible; kept fallible for parity with other option groups.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            google_client_id: matches.get_one::<String>("google-client-id").cloned(),
            google_client_secret: matches.get_one::<String>("google-client-secret").cloned(),
            github_client_id: matches.get_one::<String>("github-client-id").cloned(),
            github_client_secret: matches.get_one::<String>("github-client-secret").cloned(),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("google-client-id")
                .long("google-client-id")
                .help("Google OAuth client id")
                .env("SANO_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new("google-client-secret")
                .long("google-client-secret")
                .help("Google OAuth client secret")
                .env("SANO_GOOGLE_CLIENT_SECRET"),
        )
        .arg(
            Arg::new("github-client-id")
                .long("github-client-id")
                .help("GitHub OAuth client id")
                .env("SANO_GITHUB_CLIENT_ID"),
        )
        .arg(
            Arg::new("github-client-secret")
                .long("github-client-secret")
                .help("GitHub OAuth client secret")
                .env("SANO_GITHUB_CLIENT_SECRET"),
        )
}

#[cfg(test)]
mod tests {
    use super::Options;

    #[test]
    fn providers_absent_by_default() {
        temp_env::with_vars(
            [
                ("SANO_DSN", Some("postgres://user@localhost:5432/sano")),
                ("SANO_GOOGLE_CLIENT_ID", None::<&str>),
                ("SANO_GITHUB_CLIENT_ID", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["sano"]);
                let options = Options::parse(&matches).expect("options should parse");
                assert!(options.google_client_id.is_none());
                assert!(options.github_client_secret.is_none());
            },
        );
    }

    #[test]
    fn provider_credentials_from_env() {
        temp_env::with_vars(
            [
                ("SANO_DSN", Some("postgres://user@localhost:5432/sano")),
                ("SANO_GOOGLE_CLIENT_ID", Some("client-id")),
                ("SANO_GOOGLE_CLIENT_SECRET", Some("client-secret")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["sano"]);
                let options = Options::parse(&matches).expect("options should parse");
                assert_eq!(options.google_client_id.as_deref(), Some("client-id"));
                assert_eq!(
                    options.google_client_secret.as_deref(),
                    Some("client-secret")
                );
            },
        );
    }
}
