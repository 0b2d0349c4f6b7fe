//! Authenticated self-service endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;

use super::auth::{error::ApiError, principal::require_auth, storage::fetch_profile};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub created_at: String,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = MeResponse),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match fetch_profile(&pool, principal.user_id).await {
        Ok(Some(profile)) => {
            let response = MeResponse {
                id: principal.user_id.to_string(),
                email: principal.email,
                phone: profile.phone,
                role: principal.role,
                email_verified: profile.email_verified,
                phone_verified: profile.phone_verified,
                created_at: profile.created_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        // The session outlived the account; treat it like any other miss.
        Ok(None) => ApiError::NotFound.into_response(),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            ApiError::Upstream("Failed to fetch profile".to_string()).into_response()
        }
    }
}
