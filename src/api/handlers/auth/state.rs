//! Auth configuration and shared handler state.

use std::sync::Arc;

use super::oauth::OAuthProviders;
use super::rate_limit::RateLimiter;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const LOCAL_BASE_URL: &str = "http://localhost:3000";

/// Resolve the externally visible base URL.
///
/// Precedence is fixed because OAuth providers validate exact redirect URIs:
/// explicit application URL, then the platform deployment host (always
/// https), then the local default.
fn resolve_base_url(app_base_url: Option<&str>, deployment_url: Option<&str>) -> String {
    if let Some(url) = app_base_url.map(str::trim).filter(|url| !url.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }

    if let Some(host) = deployment_url.map(str::trim).filter(|host| !host.is_empty()) {
        let host = host.trim_end_matches('/');
        let host = host
            .strip_prefix("https://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        return format!("https://{host}");
    }

    LOCAL_BASE_URL.to_string()
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(app_base_url: Option<String>, deployment_url: Option<String>) -> Self {
        Self {
            base_url: resolve_base_url(app_base_url.as_deref(), deployment_url.as_deref()),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    /// Cookies are marked `Secure` only when the app is served over HTTPS.
    pub(super) fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    providers: OAuthProviders,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        providers: OAuthProviders,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            providers,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn providers(&self) -> &OAuthProviders {
        &self.providers
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::oauth::OAuthProviders;
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::{AuthConfig, AuthState};
    use std::sync::Arc;

    #[test]
    fn explicit_app_url_wins() {
        let config = AuthConfig::new(
            Some("https://app.sano.health/".to_string()),
            Some("sano.fly.dev".to_string()),
        );
        assert_eq!(config.base_url(), "https://app.sano.health");
        assert!(config.session_cookie_secure());
    }

    #[test]
    fn deployment_url_yields_https_host() {
        let config = AuthConfig::new(None, Some("sano.fly.dev".to_string()));
        assert_eq!(config.base_url(), "https://sano.fly.dev");

        // Scheme prefixes on the deployment value are normalized away.
        let config = AuthConfig::new(None, Some("http://sano.fly.dev/".to_string()));
        assert_eq!(config.base_url(), "https://sano.fly.dev");
    }

    #[test]
    fn local_default_when_nothing_configured() {
        let config = AuthConfig::new(None, None);
        assert_eq!(config.base_url(), "http://localhost:3000");
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = AuthConfig::new(Some("   ".to_string()), Some("".to_string()));
        assert_eq!(config.base_url(), "http://localhost:3000");
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(Some("https://app.sano.health".to_string()), None);

        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );

        let config = config
            .with_session_ttl_seconds(120)
            .with_otp_ttl_seconds(60)
            .with_reset_token_ttl_seconds(300)
            .with_resend_cooldown_seconds(10);

        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.otp_ttl_seconds(), 60);
        assert_eq!(config.reset_token_ttl_seconds(), 300);
        assert_eq!(config.resend_cooldown_seconds(), 10);
    }

    #[test]
    fn auth_state_constructs_with_noop_rate_limiter() {
        let config = AuthConfig::new(Some("https://app.sano.health".to_string()), None);
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(config, OAuthProviders::disabled(), limiter);
        assert_eq!(state.config().base_url(), "https://app.sano.health");
        assert!(state.providers().client_for("google").is_none());
    }
}
