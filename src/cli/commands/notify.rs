use anyhow::Result;
use clap::{Arg, Command};

/// Email/SMS gateway options. When a gateway URL + token pair is absent the
/// service falls back to a logging sender instead of refusing to start.
#[derive(Debug)]
pub struct Options {
    pub email_gateway_url: Option<String>,
    pub email_gateway_token: Option<String>,
    pub email_from: String,
    pub sms_gateway_url: Option<String>,
    pub sms_gateway_token: Option<String>,
    pub sms_from: String,
}

impl Options {
    /// # Errors
    /// Currently infallible; kept fallible for parity with other option groups.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            email_gateway_url: matches.get_one::<String>("email-gateway-url").cloned(),
            email_gateway_token: matches.get_one::<String>("email-gateway-token").cloned(),
            email_from: matches
                .get_one::<String>("email-from")
                .cloned()
                .unwrap_or_else(|| "no-reply@sano.health".to_string()),
            sms_gateway_url: matches.get_one::<String>("sms-gateway-url").cloned(),
            sms_gateway_token: matches.get_one::<String>("sms-gateway-token").cloned(),
            sms_from: matches
                .get_one::<String>("sms-from")
                .cloned()
                .unwrap_or_else(|| "Sano".to_string()),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-gateway-url")
                .long("email-gateway-url")
                .help("HTTP endpoint of the transactional email gateway")
                .env("SANO_EMAIL_GATEWAY_URL"),
        )
        .arg(
            Arg::new("email-gateway-token")
                .long("email-gateway-token")
                .help("Bearer token for the email gateway")
                .env("SANO_EMAIL_GATEWAY_TOKEN"),
        )
        .arg(
            Arg::new("email-from")
                .long("email-from")
                .help("Sender address for outbound email")
                .env("SANO_EMAIL_FROM")
                .default_value("no-reply@sano.health"),
        )
        .arg(
            Arg::new("sms-gateway-url")
                .long("sms-gateway-url")
                .help("HTTP endpoint of the SMS gateway")
                .env("SANO_SMS_GATEWAY_URL"),
        )
        .arg(
            Arg::new("sms-gateway-token")
                .long("sms-gateway-token")
                .help("Bearer token for the SMS gateway")
                .env("SANO_SMS_GATEWAY_TOKEN"),
        )
        .arg(
            Arg::new("sms-from")
                .long("sms-from")
                .help("Sender id for outbound SMS")
                .env("SANO_SMS_FROM")
                .default_value("Sano"),
        )
}
