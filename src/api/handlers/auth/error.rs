//! HTTP error taxonomy for the JSON endpoints.
//!
//! Handlers translate every component failure into one of these variants;
//! nothing crosses the HTTP boundary unhandled. Bodies are uniform
//! `{"success": false, "message": ...}` JSON. OAuth endpoints redirect with
//! an `error` query parameter instead and never use this type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// No or invalid session.
    Unauthenticated,
    /// Authenticated but insufficient role.
    Forbidden,
    /// Missing or malformed input.
    Validation(String),
    /// Resource absent.
    NotFound,
    /// Code or token did not match a live row. One message for every cause
    /// so callers cannot probe which accounts exist.
    InvalidCode,
    /// Account already exists.
    Conflict(String),
    /// Too many attempts from this client or for this identifier.
    RateLimited,
    /// Database or delivery gateway unavailable. Callers may resubmit.
    Upstream(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::InvalidCode => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Unauthenticated => "Authentication required".to_string(),
            Self::Forbidden => "Insufficient permissions".to_string(),
            Self::Validation(message) | Self::Conflict(message) | Self::Upstream(message) => {
                message.clone()
            }
            Self::NotFound => "Not found".to_string(),
            Self::InvalidCode => "Invalid or expired code".to_string(),
            Self::RateLimited => "Too many attempts, try again later".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "success": false, "message": self.message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Validation("missing payload".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidCode.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("account already exists".to_string())
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Upstream("delivery failed".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_code_message_is_uniform() {
        // The same body regardless of whether the user, code, or expiry failed.
        assert_eq!(
            ApiError::InvalidCode.message(),
            "Invalid or expired code".to_string()
        );
    }
}
