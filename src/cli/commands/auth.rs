use anyhow::Result;
use clap::{Arg, Command};

/// Session, verification, and base-URL options parsed from the CLI.
#[derive(Debug)]
pub struct Options {
    pub app_base_url: Option<String>,
    pub deployment_url: Option<String>,
    pub session_ttl_seconds: i64,
    pub otp_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub resend_cooldown_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing from the matches.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            app_base_url: matches.get_one::<String>("app-base-url").cloned(),
            deployment_url: matches.get_one::<String>("deployment-url").cloned(),
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .unwrap_or(86_400),
            otp_ttl_seconds: matches
                .get_one::<i64>("otp-ttl-seconds")
                .copied()
                .unwrap_or(900),
            reset_token_ttl_seconds: matches
                .get_one::<i64>("reset-token-ttl-seconds")
                .copied()
                .unwrap_or(3_600),
            resend_cooldown_seconds: matches
                .get_one::<i64>("resend-cooldown-seconds")
                .copied()
                .unwrap_or(60),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("app-base-url")
                .long("app-base-url")
                .help("Application base URL used for cookies, CORS, and OAuth redirect URIs")
                .env("SANO_APP_BASE_URL"),
        )
        .arg(
            Arg::new("deployment-url")
                .long("deployment-url")
                .help("Platform-provided deployment URL, used when no app base URL is configured")
                .env("SANO_DEPLOYMENT_URL"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds")
                .env("SANO_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("One-time verification code TTL in seconds")
                .env("SANO_OTP_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("SANO_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("resend-cooldown-seconds")
                .long("resend-cooldown-seconds")
                .help("Cooldown before a new code of the same purpose is issued")
                .env("SANO_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[cfg(test)]
mod tests {
    use super::Options;

    #[test]
    fn defaults_apply_without_flags() {
        temp_env::with_vars(
            [
                ("SANO_DSN", Some("postgres://user@localhost:5432/sano")),
                ("SANO_APP_BASE_URL", None::<&str>),
                ("SANO_DEPLOYMENT_URL", None::<&str>),
                ("SANO_SESSION_TTL_SECONDS", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["sano"]);
                let options = Options::parse(&matches).expect("options should parse");
                assert_eq!(options.app_base_url, None);
                assert_eq!(options.deployment_url, None);
                assert_eq!(options.session_ttl_seconds, 86_400);
                assert_eq!(options.otp_ttl_seconds, 900);
                assert_eq!(options.reset_token_ttl_seconds, 3_600);
                assert_eq!(options.resend_cooldown_seconds, 60);
            },
        );
    }

    #[test]
    fn env_overrides_ttls() {
        temp_env::with_vars(
            [
                ("SANO_DSN", Some("postgres://user@localhost:5432/sano")),
                ("SANO_SESSION_TTL_SECONDS", Some("120")),
                ("SANO_OTP_TTL_SECONDS", Some("60")),
                ("SANO_DEPLOYMENT_URL", Some("sano.fly.dev")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["sano"]);
                let options = Options::parse(&matches).expect("options should parse");
                assert_eq!(options.session_ttl_seconds, 120);
                assert_eq!(options.otp_ttl_seconds, 60);
                assert_eq!(options.deployment_url.as_deref(), Some("sano.fly.dev"));
            },
        );
    }
}
