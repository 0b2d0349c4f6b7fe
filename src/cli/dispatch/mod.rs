//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, notify, oauth};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth: auth::Options::parse(matches)?,
        oauth: oauth::Options::parse(matches)?,
        notify: notify::Options::parse(matches)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::actions::Action;

    #[test]
    fn server_action_from_matches() {
        temp_env::with_vars(
            [
                ("SANO_DSN", None::<&str>),
                ("SANO_PORT", None::<&str>),
                ("SANO_APP_BASE_URL", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "sano",
                    "--dsn",
                    "postgres://user@localhost:5432/sano",
                    "--port",
                    "9000",
                ]);
                let action = handler(&matches).expect("dispatch should succeed");
                let Action::Server(args) = action;
                assert_eq!(args.port, 9000);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/sano");
                assert!(args.oauth.google_client_id.is_none());
            },
        );
    }
}
