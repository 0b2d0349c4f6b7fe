//! Password reset token endpoints.
//!
//! Reset tokens exist only downstream of a verified password-reset code.
//! Consuming one rotates the password hash and revokes every session for
//! the user in the same transaction.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    error::ApiError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    storage::{consume_reset_token_and_set_password, peek_reset_token},
    types::{
        MessageResponse, ResetPasswordRequest, VerifyResetTokenRequest, VerifyResetTokenResponse,
    },
    utils::{extract_client_ip, hash_password, hash_token, valid_password},
};

#[utoipa::path(
    post,
    path = "/v1/auth/verify-reset-token",
    request_body = VerifyResetTokenRequest,
    responses(
        (status = 200, description = "Whether the token is live, and for whom", body = VerifyResetTokenResponse)
    ),
    tag = "auth"
)]
pub async fn verify_reset_token(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyResetTokenRequest>>,
) -> impl IntoResponse {
    let request: VerifyResetTokenRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return ApiError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let token = request.token.trim();
    if token.is_empty() {
        return ApiError::Validation("Missing token".to_string()).into_response();
    }

    let token_hash = hash_token(token);
    match peek_reset_token(&pool, &token_hash).await {
        Ok(user_id) => {
            let response = VerifyResetTokenResponse {
                valid: user_id.is_some(),
                user_id: user_id.map(|id| id.to_string()),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to check reset token: {err}");
            ApiError::Upstream("Failed to check reset token".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated; all sessions revoked"),
        (status = 400, description = "Invalid token or password", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return ApiError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let token = request.token.trim();
    if token.is_empty() {
        return ApiError::Validation("Missing token".to_string()).into_response();
    }

    if !valid_password(&request.password) {
        return ApiError::Validation("Password must be 8-128 characters".to_string())
            .into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResetPassword)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return ApiError::Upstream("Password reset failed".to_string()).into_response();
        }
    };

    let token_hash = hash_token(token);
    match consume_reset_token_and_set_password(&pool, &token_hash, &password_hash).await {
        Ok(Some(_user_id)) => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => ApiError::InvalidCode.into_response(),
        Err(err) => {
            error!("Failed to reset password: {err}");
            ApiError::Upstream("Password reset failed".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{reset_password, verify_reset_token};
    use crate::api::handlers::auth::oauth::OAuthProviders;
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;
    use crate::api::handlers::auth::state::{AuthConfig, AuthState};
    use crate::api::handlers::auth::types::{ResetPasswordRequest, VerifyResetTokenRequest};
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

    #[tokio::test]
    async fn verify_reset_token_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_reset_token(Extension(pool), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_reset_token_empty_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_reset_token(
            Extension(pool),
            Some(Json(VerifyResetTokenRequest {
                token: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_short_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = reset_password(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ResetPasswordRequest {
                token: "token".to_string(),
                password: "short".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
