use crate::{
    api,
    api::{
        handlers::auth::{oauth::OAuthProviders, AuthConfig},
        notify::{EmailGateway, Notifier, SmsGateway},
    },
    cli::commands::{auth, notify, oauth},
};
use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: auth::Options,
    pub oauth: oauth::Options,
    pub notify: notify::Options,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built or the server fails
/// to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.auth.app_base_url, args.auth.deployment_url)
        .with_session_ttl_seconds(args.auth.session_ttl_seconds)
        .with_otp_ttl_seconds(args.auth.otp_ttl_seconds)
        .with_reset_token_ttl_seconds(args.auth.reset_token_ttl_seconds)
        .with_resend_cooldown_seconds(args.auth.resend_cooldown_seconds);

    info!("Base URL resolved to {}", auth_config.base_url());

    let providers = OAuthProviders::from_credentials(
        args.oauth.google_client_id,
        args.oauth.google_client_secret,
        args.oauth.github_client_id,
        args.oauth.github_client_secret,
    );

    let http_client = reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .context("Failed to build outbound HTTP client")?;

    let notifier = Notifier::new(
        EmailGateway::from_config(
            &http_client,
            args.notify.email_gateway_url,
            args.notify.email_gateway_token,
            args.notify.email_from,
        ),
        SmsGateway::from_config(
            &http_client,
            args.notify.sms_gateway_url,
            args.notify.sms_gateway_token,
            args.notify.sms_from,
        ),
    );

    api::new(args.port, args.dsn, auth_config, providers, notifier).await
}
