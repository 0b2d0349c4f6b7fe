//! Registration and password login.

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    error::ApiError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    session::session_cookie,
    state::AuthState,
    storage::{insert_session, insert_user, lookup_credentials, RegisterOutcome},
    types::{LoginRequest, MessageResponse, RegisterRequest},
    utils::{
        extract_client_ip, hash_password, normalize_email, normalize_phone, valid_email,
        valid_password, valid_phone, verify_password, Identifier,
    },
};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = MessageResponse),
        (status = 400, description = "Validation error", body = MessageResponse),
        (status = 409, description = "Account already exists", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return ApiError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::Validation("Invalid email".to_string()).into_response();
    }

    let phone = match request.phone.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let phone = normalize_phone(raw);
            if !valid_phone(&phone) {
                return ApiError::Validation("Invalid phone number".to_string()).into_response();
            }
            Some(phone)
        }
    };

    if !valid_password(&request.password) {
        return ApiError::Validation("Password must be 8-128 characters".to_string())
            .into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return ApiError::Upstream("Registration failed".to_string()).into_response();
        }
    };

    match insert_user(&pool, &email, phone.as_deref(), &password_hash).await {
        Ok(RegisterOutcome::Created) => (
            StatusCode::CREATED,
            Json(MessageResponse::ok("Account created")),
        )
            .into_response(),
        Ok(RegisterOutcome::Conflict) => {
            ApiError::Conflict("Account already exists".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to insert user: {err}");
            ApiError::Upstream("Registration failed".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Login success, session cookie set"),
        (status = 400, description = "Validation error", body = MessageResponse),
        (status = 401, description = "Invalid credentials", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return ApiError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let Some(identifier) = Identifier::parse(&request.identifier) else {
        return ApiError::Validation("Invalid identifier".to_string()).into_response();
    };

    if request.password.is_empty() {
        return ApiError::Validation("Missing password".to_string()).into_response();
    }

    // Rate-limit before any credential work to keep abuse cheap to reject.
    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }
    if auth_state
        .rate_limiter()
        .check_identifier(identifier.as_str(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return ApiError::RateLimited.into_response();
    }

    let credentials = match lookup_credentials(&pool, &identifier).await {
        Ok(credentials) => credentials,
        Err(err) => {
            error!("Login lookup failed: {err}");
            return ApiError::Upstream("Login failed".to_string()).into_response();
        }
    };

    // Unknown accounts and OAuth-only accounts burn an equivalent amount of
    // hashing work so the timing profile matches the stored-hash path, and
    // every failure maps to the same response.
    let user_id = match credentials {
        Some(record) => match record.password_hash {
            Some(stored_hash) if verify_password(&stored_hash, &request.password) => {
                Some(record.user_id)
            }
            Some(_) => None,
            None => {
                let _ = hash_password(&request.password);
                None
            }
        },
        None => {
            let _ = hash_password(&request.password);
            None
        }
    };

    let Some(user_id) = user_id else {
        return ApiError::Unauthenticated.into_response();
    };

    let token = match insert_session(&pool, user_id, auth_state.config().session_ttl_seconds())
        .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return ApiError::Upstream("Login failed".to_string()).into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token) {
        Ok(cookie) => {
            // Attach the cookie so the browser can present it on future requests.
            response_headers.insert(SET_COOKIE, cookie);
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                response_headers.insert(AUTHORIZATION, value);
            }
            (StatusCode::NO_CONTENT, response_headers).into_response()
        }
        Err(err) => {
            error!("Failed to set session cookie: {err}");
            ApiError::Upstream("Login failed".to_string()).into_response()
        }
    }
}
