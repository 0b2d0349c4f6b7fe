//! One-time code issuance and verification.
//!
//! Send responses are identical for known and unknown identifiers, so the
//! endpoint cannot be used to probe which accounts exist. The persisted code
//! outlives a failed delivery: the caller can ask for a new send and the
//! same code (or its replacement) is dispatched again.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::notify::{EmailMessage, Notifier, SmsMessage};

use super::{
    error::ApiError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    storage::{
        code_cooldown_active, consume_verification_code, lookup_user_id,
        replace_verification_code, CodePurpose,
    },
    types::{
        CodeIntent, DeliveryMethod, MessageResponse, SendCodeRequest, VerifyOtpRequest,
        VerifyOtpResponse,
    },
    utils::{extract_client_ip, Identifier},
};

const SEND_CODE_MESSAGE: &str = "If an account matches, a verification code has been sent";

/// Map the requested channel + intent onto a stored code purpose.
const fn code_purpose(method: DeliveryMethod, intent: CodeIntent) -> CodePurpose {
    match (intent, method) {
        (CodeIntent::PasswordReset, _) => CodePurpose::PasswordReset,
        (CodeIntent::Verification, DeliveryMethod::Email) => CodePurpose::EmailVerification,
        (CodeIntent::Verification, DeliveryMethod::Sms) => CodePurpose::PhoneVerification,
    }
}

fn code_email(to: &str, code: &str, ttl_minutes: i64) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Your Sano verification code".to_string(),
        body: format!(
            "Your Sano verification code is {code}. It expires in {ttl_minutes} minutes."
        ),
    }
}

fn code_sms(to: &str, code: &str) -> SmsMessage {
    SmsMessage {
        to: to.to_string(),
        body: format!("Your Sano verification code is {code}."),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/send-verification-code",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Accepted; the response does not reveal whether the account exists", body = MessageResponse),
        (status = 400, description = "Validation error", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse),
        (status = 500, description = "Delivery failed; the issued code stays valid", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn send_verification_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    notifier: Extension<Arc<Notifier>>,
    payload: Option<Json<SendCodeRequest>>,
) -> impl IntoResponse {
    let request: SendCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return ApiError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let Some(identifier) = Identifier::parse(&request.identifier) else {
        return ApiError::Validation("Invalid identifier".to_string()).into_response();
    };

    // The destination is the identifier itself, so it has to match the channel.
    match (&identifier, request.method) {
        (Identifier::Email(_), DeliveryMethod::Email)
        | (Identifier::Phone(_), DeliveryMethod::Sms) => {}
        (Identifier::Email(_), DeliveryMethod::Sms) => {
            return ApiError::Validation("SMS delivery requires a phone number".to_string())
                .into_response();
        }
        (Identifier::Phone(_), DeliveryMethod::Email) => {
            return ApiError::Validation("Email delivery requires an email address".to_string())
                .into_response();
        }
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::SendCode)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }
    if auth_state
        .rate_limiter()
        .check_identifier(identifier.as_str(), RateLimitAction::SendCode)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let user_id = match lookup_user_id(&pool, &identifier).await {
        Ok(user_id) => user_id,
        Err(err) => {
            error!("Failed to resolve identifier: {err}");
            return ApiError::Upstream("Failed to send verification code".to_string())
                .into_response();
        }
    };

    // Unknown identifiers get the same response as known ones.
    let Some(user_id) = user_id else {
        return (StatusCode::OK, Json(MessageResponse::ok(SEND_CODE_MESSAGE))).into_response();
    };

    let purpose = code_purpose(
        request.method,
        request.purpose.unwrap_or(CodeIntent::Verification),
    );

    let config = auth_state.config();
    match code_cooldown_active(&pool, user_id, purpose, config.resend_cooldown_seconds()).await {
        // Inside the cooldown the previous code is still live; stay opaque.
        Ok(true) => {
            return (StatusCode::OK, Json(MessageResponse::ok(SEND_CODE_MESSAGE))).into_response();
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check code cooldown: {err}");
            return ApiError::Upstream("Failed to send verification code".to_string())
                .into_response();
        }
    }

    let code = match replace_verification_code(&pool, user_id, purpose, config.otp_ttl_seconds())
        .await
    {
        Ok(code) => code,
        Err(err) => {
            error!("Failed to issue verification code: {err}");
            return ApiError::Upstream("Failed to send verification code".to_string())
                .into_response();
        }
    };

    let ttl_minutes = config.otp_ttl_seconds() / 60;
    let dispatch = match request.method {
        DeliveryMethod::Email => {
            notifier
                .send_email(&code_email(identifier.as_str(), &code, ttl_minutes))
                .await
        }
        DeliveryMethod::Sms => notifier.send_sms(&code_sms(identifier.as_str(), &code)).await,
    };

    match dispatch {
        Ok(_) => (StatusCode::OK, Json(MessageResponse::ok(SEND_CODE_MESSAGE))).into_response(),
        Err(err) => {
            // The code is already persisted and stays valid; only delivery failed.
            error!("Failed to dispatch verification code: {err}");
            ApiError::Upstream("Failed to send verification code".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Code verified; reset codes also return a single-use reset token", body = VerifyOtpResponse),
        (status = 400, description = "Invalid or expired code", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let request: VerifyOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return ApiError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let Some(identifier) = Identifier::parse(&request.identifier) else {
        // Same failure as a wrong code so the response never identifies accounts.
        return ApiError::InvalidCode.into_response();
    };

    let code = request.code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return ApiError::InvalidCode.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyCode)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }
    if auth_state
        .rate_limiter()
        .check_identifier(identifier.as_str(), RateLimitAction::VerifyCode)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let user_id = match lookup_user_id(&pool, &identifier).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return ApiError::InvalidCode.into_response(),
        Err(err) => {
            error!("Failed to resolve identifier: {err}");
            return ApiError::Upstream("Verification failed".to_string()).into_response();
        }
    };

    let purpose = match consume_verification_code(&pool, user_id, code).await {
        Ok(Some(purpose)) => purpose,
        Ok(None) => return ApiError::InvalidCode.into_response(),
        Err(err) => {
            error!("Failed to verify code: {err}");
            return ApiError::Upstream("Verification failed".to_string()).into_response();
        }
    };

    let reset_token = if purpose == CodePurpose::PasswordReset {
        let ttl = auth_state.config().reset_token_ttl_seconds();
        match super::storage::replace_reset_token(&pool, user_id, ttl).await {
            Ok(token) => Some(token),
            Err(err) => {
                error!("Failed to issue reset token: {err}");
                return ApiError::Upstream("Verification failed".to_string()).into_response();
            }
        }
    } else {
        None
    };

    let response = VerifyOtpResponse {
        success: true,
        message: "Code verified".to_string(),
        reset_token,
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{code_purpose, send_verification_code, verify_otp};
    use crate::api::handlers::auth::oauth::OAuthProviders;
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;
    use crate::api::handlers::auth::state::{AuthConfig, AuthState};
    use crate::api::handlers::auth::storage::CodePurpose;
    use crate::api::handlers::auth::types::{
        CodeIntent, DeliveryMethod, SendCodeRequest, VerifyOtpRequest,
    };
    use crate::api::notify::{EmailGateway, Notifier, SmsGateway};
    use anyhow::Result;
    use axum::{
        extract::Extension,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        Json,
    };
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new(Some("https://app.sano.health".to_string()), None),
            OAuthProviders::disabled(),
            Arc::new(NoopRateLimiter),
        ))
    }

    fn notifier() -> Arc<Notifier> {
        Arc::new(Notifier::new(EmailGateway::Log, SmsGateway::Log))
    }

    #[test]
    fn purpose_mapping() {
        assert_eq!(
            code_purpose(DeliveryMethod::Email, CodeIntent::Verification),
            CodePurpose::EmailVerification
        );
        assert_eq!(
            code_purpose(DeliveryMethod::Sms, CodeIntent::Verification),
            CodePurpose::PhoneVerification
        );
        assert_eq!(
            code_purpose(DeliveryMethod::Email, CodeIntent::PasswordReset),
            CodePurpose::PasswordReset
        );
        assert_eq!(
            code_purpose(DeliveryMethod::Sms, CodeIntent::PasswordReset),
            CodePurpose::PasswordReset
        );
    }

    #[tokio::test]
    async fn send_code_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = send_verification_code(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Extension(notifier()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn send_code_rejects_mismatched_channel() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = send_verification_code(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Extension(notifier()),
            Some(Json(SendCodeRequest {
                identifier: "alice@example.com".to_string(),
                method: DeliveryMethod::Sms,
                purpose: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_otp_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_otp(HeaderMap::new(), Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_otp_rejects_malformed_code() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_otp(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Some(Json(VerifyOtpRequest {
                identifier: "alice@example.com".to_string(),
                code: "12ab56".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
