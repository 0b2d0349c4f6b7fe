//! OAuth sign-in: authorization redirects and callback handling.
//!
//! The authorize redirect carries a fresh random `state` value mirrored in a
//! short-lived `HttpOnly` cookie; the callback rejects any response whose
//! state does not match that cookie. Redirect URIs are derived from the
//! resolved base URL, which is why its resolution order is fixed.
//!
//! OAuth failures redirect back to the application with an `error` query
//! parameter instead of returning JSON.

use axum::{
    extract::{Extension, Path, Query},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Redirect, Response},
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, Instrument};
use url::Url;

use super::{
    session::session_cookie,
    state::{AuthConfig, AuthState},
    storage::{insert_session, upsert_oauth_user},
    utils::{cookie_value, generate_state_token},
};

const STATE_COOKIE_NAME: &str = "sano_oauth_state";
const STATE_COOKIE_TTL_SECONDS: i64 = 10 * 60;

/// Fixed endpoints for a supported provider.
pub struct ProviderEndpoints {
    pub(super) name: &'static str,
    authorize_url: &'static str,
    token_url: &'static str,
    userinfo_url: &'static str,
    scope: &'static str,
}

const GOOGLE: ProviderEndpoints = ProviderEndpoints {
    name: "google",
    authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo",
    scope: "openid email profile",
};

const GITHUB: ProviderEndpoints = ProviderEndpoints {
    name: "github",
    authorize_url: "https://github.com/login/oauth/authorize",
    token_url: "https://github.com/login/oauth/access_token",
    userinfo_url: "https://api.github.com/user",
    scope: "read:user user:email",
};

/// Client credentials for one configured provider.
pub struct ProviderClient {
    client_id: String,
    client_secret: SecretString,
}

impl ProviderClient {
    fn from_credentials(client_id: Option<String>, client_secret: Option<String>) -> Option<Self> {
        match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some(Self {
                    client_id: id,
                    client_secret: SecretString::from(secret),
                })
            }
            _ => None,
        }
    }
}

/// A provider resolved from the request path.
pub struct ProviderRef<'a> {
    pub(super) endpoints: &'static ProviderEndpoints,
    pub(super) client: &'a ProviderClient,
}

/// All providers known to this deployment. Unconfigured providers stay
/// `None` and their routes answer with a redirect error.
pub struct OAuthProviders {
    google: Option<ProviderClient>,
    github: Option<ProviderClient>,
}

impl OAuthProviders {
    #[must_use]
    pub fn from_credentials(
        google_client_id: Option<String>,
        google_client_secret: Option<String>,
        github_client_id: Option<String>,
        github_client_secret: Option<String>,
    ) -> Self {
        Self {
            google: ProviderClient::from_credentials(google_client_id, google_client_secret),
            github: ProviderClient::from_credentials(github_client_id, github_client_secret),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            google: None,
            github: None,
        }
    }

    #[must_use]
    pub fn client_for(&self, provider: &str) -> Option<ProviderRef<'_>> {
        match provider {
            "google" => self.google.as_ref().map(|client| ProviderRef {
                endpoints: &GOOGLE,
                client,
            }),
            "github" => self.github.as_ref().map(|client| ProviderRef {
                endpoints: &GITHUB,
                client,
            }),
            _ => None,
        }
    }
}

fn redirect_uri(base_url: &str, provider: &str) -> String {
    format!("{base_url}/v1/auth/oauth/{provider}/callback")
}

fn error_redirect(base_url: &str, code: &str) -> String {
    format!("{base_url}/login?error={code}")
}

/// Build the provider authorize URL for one flow.
fn build_authorization_url(
    endpoints: &ProviderEndpoints,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(endpoints.authorize_url).context("invalid authorize endpoint")?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", endpoints.scope)
        .append_pair("state", state);
    Ok(url)
}

fn state_cookie(
    auth_config: &AuthConfig,
    state: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!(
        "{STATE_COOKIE_NAME}={state}; Path=/v1/auth/oauth; HttpOnly; SameSite=Lax; Max-Age={STATE_COOKIE_TTL_SECONDS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_state_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie =
        format!("{STATE_COOKIE_NAME}=; Path=/v1/auth/oauth; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Start the authorization-code flow for one provider.
pub async fn oauth_start(
    Path(provider): Path<String>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let base_url = auth_state.config().base_url();

    let Some(provider_ref) = auth_state.providers().client_for(&provider) else {
        return Redirect::to(&error_redirect(base_url, "provider_not_configured")).into_response();
    };

    let state = match generate_state_token() {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to generate OAuth state: {err}");
            return Redirect::to(&error_redirect(base_url, "oauth_failed")).into_response();
        }
    };

    let authorize_url = match build_authorization_url(
        provider_ref.endpoints,
        &provider_ref.client.client_id,
        &redirect_uri(base_url, provider_ref.endpoints.name),
        &state,
    ) {
        Ok(url) => url,
        Err(err) => {
            error!("Failed to build authorize URL: {err}");
            return Redirect::to(&error_redirect(base_url, "oauth_failed")).into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match state_cookie(auth_state.config(), &state) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build state cookie: {err}");
            return Redirect::to(&error_redirect(base_url, "oauth_failed")).into_response();
        }
    }

    (response_headers, Redirect::to(authorize_url.as_str())).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
}

/// Complete the flow: state check, code exchange, profile fetch, session.
pub async fn oauth_callback(
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let base_url = auth_state.config().base_url();

    let Some(provider_ref) = auth_state.providers().client_for(&provider) else {
        return Redirect::to(&error_redirect(base_url, "provider_not_configured")).into_response();
    };

    if params.error.is_some() {
        return Redirect::to(&error_redirect(base_url, "provider_denied")).into_response();
    }

    // CSRF check: the callback state must equal the value set for this flow.
    let cookie_state = cookie_value(&headers, STATE_COOKIE_NAME);
    let callback_state = params.state.as_deref().map(str::trim).unwrap_or_default();
    let state_matches = cookie_state
        .as_deref()
        .is_some_and(|value| !value.is_empty() && value == callback_state);
    if !state_matches {
        return Redirect::to(&error_redirect(base_url, "state_mismatch")).into_response();
    }

    let Some(code) = params.code.as_deref().map(str::trim).filter(|code| !code.is_empty())
    else {
        return Redirect::to(&error_redirect(base_url, "missing_code")).into_response();
    };

    let (subject, email) = match provider_profile(
        provider_ref.endpoints,
        provider_ref.client,
        code,
        &redirect_uri(base_url, provider_ref.endpoints.name),
    )
    .await
    {
        Ok(profile) => profile,
        Err(err) => {
            error!("OAuth exchange failed for {provider}: {err}");
            return Redirect::to(&error_redirect(base_url, "oauth_exchange_failed"))
                .into_response();
        }
    };

    let user_id =
        match upsert_oauth_user(&pool, provider_ref.endpoints.name, &subject, &email).await {
            Ok(user_id) => user_id,
            Err(err) => {
                error!("Failed to upsert OAuth user: {err}");
                return Redirect::to(&error_redirect(base_url, "oauth_failed")).into_response();
            }
        };

    let token = match insert_session(&pool, user_id, auth_state.config().session_ttl_seconds())
        .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return Redirect::to(&error_redirect(base_url, "oauth_failed")).into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to set session cookie: {err}");
            return Redirect::to(&error_redirect(base_url, "oauth_failed")).into_response();
        }
    }
    if let Ok(cookie) = clear_state_cookie(auth_state.config()) {
        response_headers.append(SET_COOKIE, cookie);
    }

    (response_headers, Redirect::to(base_url)).into_response()
}

/// Exchange the authorization code and fetch the provider profile.
async fn provider_profile(
    endpoints: &ProviderEndpoints,
    client: &ProviderClient,
    code: &str,
    redirect_uri: &str,
) -> Result<(String, String)> {
    let http = reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .context("failed to build OAuth HTTP client")?;

    let span = tracing::info_span!(
        "oauth.token_exchange",
        http.method = "POST",
        provider = endpoints.name
    );
    let response = http
        .post(endpoints.token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .instrument(span)
        .await
        .context("token exchange request failed")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("token endpoint returned {status}"));
    }

    let exchange: TokenExchangeResponse = response
        .json()
        .await
        .context("invalid token endpoint response")?;
    let access_token = exchange
        .access_token
        .ok_or_else(|| anyhow!("token endpoint returned no access token"))?;

    let span = tracing::info_span!(
        "oauth.userinfo",
        http.method = "GET",
        provider = endpoints.name
    );
    let response = http
        .get(endpoints.userinfo_url)
        .bearer_auth(&access_token)
        .send()
        .instrument(span)
        .await
        .context("userinfo request failed")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("userinfo endpoint returned {status}"));
    }

    let profile: serde_json::Value = response.json().await.context("invalid userinfo response")?;
    extract_profile(endpoints.name, &profile)
}

/// Pull (subject, email) out of a provider profile document.
fn extract_profile(provider: &str, profile: &serde_json::Value) -> Result<(String, String)> {
    let subject = match provider {
        // GitHub ids are numeric; everything else uses the OIDC `sub` claim.
        "github" => profile
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string()),
        _ => profile
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
    };
    let subject = subject.ok_or_else(|| anyhow!("profile missing subject"))?;

    let email = profile
        .get("email")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_lowercase)
        .ok_or_else(|| anyhow!("profile missing email"))?;

    Ok((subject, email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashMap;

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn authorization_url_carries_flow_parameters() -> Result<()> {
        let state = generate_state_token()?;
        let url = build_authorization_url(
            &GOOGLE,
            "client-id",
            "https://app.sano.health/v1/auth/oauth/google/callback",
            &state,
        )?;

        assert!(url.as_str().starts_with(GOOGLE.authorize_url));
        let params = query_map(&url);
        assert_eq!(params.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(
            params.get("redirect_uri").map(String::as_str),
            Some("https://app.sano.health/v1/auth/oauth/google/callback")
        );
        assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(params.get("state").map(String::as_str), Some(state.as_str()));
        Ok(())
    }

    #[test]
    fn consecutive_flows_use_distinct_states() -> Result<()> {
        let first = generate_state_token()?;
        let second = generate_state_token()?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn providers_require_both_credentials() {
        let providers = OAuthProviders::from_credentials(
            Some("id".to_string()),
            None,
            Some("id".to_string()),
            Some("secret".to_string()),
        );
        assert!(providers.client_for("google").is_none());
        assert!(providers.client_for("github").is_some());
        assert!(providers.client_for("gitlab").is_none());
    }

    #[test]
    fn extract_profile_google_shape() -> Result<()> {
        let profile = serde_json::json!({
            "sub": "1234567890",
            "email": "Alice@Example.com",
            "email_verified": true,
        });
        let (subject, email) = extract_profile("google", &profile)?;
        assert_eq!(subject, "1234567890");
        assert_eq!(email, "alice@example.com");
        Ok(())
    }

    #[test]
    fn extract_profile_github_shape() -> Result<()> {
        let profile = serde_json::json!({
            "id": 583231,
            "login": "octocat",
            "email": "octocat@github.com",
        });
        let (subject, email) = extract_profile("github", &profile)?;
        assert_eq!(subject, "583231");
        assert_eq!(email, "octocat@github.com");
        Ok(())
    }

    #[test]
    fn extract_profile_requires_email() {
        let profile = serde_json::json!({ "id": 583231, "email": null });
        assert!(extract_profile("github", &profile).is_err());
    }

    #[test]
    fn state_cookie_scoped_to_oauth_routes() -> Result<()> {
        let config = AuthConfig::new(Some("https://app.sano.health".to_string()), None);
        let cookie = state_cookie(&config, "state-value")?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("sano_oauth_state=state-value"));
        assert!(value.contains("Path=/v1/auth/oauth"));
        assert!(value.contains("Max-Age=600"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        Ok(())
    }

    #[test]
    fn error_redirect_targets_login_page() {
        assert_eq!(
            error_redirect("https://app.sano.health", "state_mismatch"),
            "https://app.sano.health/login?error=state_mismatch"
        );
    }
}
