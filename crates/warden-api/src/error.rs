//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use warden_core::{StoreError, UniqueField};

use crate::auth::AuthError;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// HTTP status code
    pub status: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Validation(String),
    /// Detail is logged, never returned to the client
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Unauthorized(msg) => ApiError::new(status, "UNAUTHORIZED", msg),
            AppError::Forbidden(msg) => ApiError::new(status, "FORBIDDEN", msg),
            AppError::BadRequest(msg) => ApiError::new(status, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => ApiError::new(status, "NOT_FOUND", msg),
            AppError::Validation(msg) => ApiError::new(status, "VALIDATION_ERROR", msg),
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                ApiError::new(status, "INTERNAL_ERROR", "Internal server error")
            }
        };

        let mut response = (status, Json(error)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<warden_core::PasswordError> for AppError {
    fn from(err: warden_core::PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::Duplicate(UniqueField::Email) => {
                AppError::BadRequest("Email already registered".to_string())
            }
            StoreError::Duplicate(UniqueField::Username) => {
                AppError::BadRequest("Username already taken".to_string())
            }
            StoreError::Duplicate(field) => AppError::BadRequest(format!("Duplicate {field}")),
            StoreError::Guard(violation) => AppError::BadRequest(violation.to_string()),
            StoreError::Database(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken(_)
            | AuthError::SessionInvalid
            | AuthError::UnknownPrincipal
            | AuthError::SecondFactorFailed(_) => AppError::Unauthorized(err.to_string()),
            AuthError::Inactive(_) => AppError::Forbidden(err.to_string()),
            AuthError::SecondFactorNotConfigured => AppError::BadRequest(err.to_string()),
            AuthError::Issuance(e) => AppError::Internal(e.to_string()),
            AuthError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;
    use warden_core::{GuardViolation, PrincipalKind};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        let response = AppError::Internal("connection refused at 10.0.0.5".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["message"], "Internal server error");
        assert_eq!(json["status"], 500);
        assert!(!String::from_utf8_lossy(&body).contains("10.0.0.5"));
    }

    #[test]
    fn test_auth_errors_map_to_boundary_kinds() {
        assert!(matches!(
            AppError::from(AuthError::InvalidToken(TokenError::WrongClass)),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::Inactive(PrincipalKind::Admin)),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::SecondFactorNotConfigured),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::Store(StoreError::Database("boom".into()))),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn test_guard_violation_message() {
        let AppError::BadRequest(msg) =
            AppError::from(StoreError::Guard(GuardViolation::LastSuperAdmin))
        else {
            panic!("expected bad request");
        };
        assert_eq!(msg, "At least one active super admin is required");
    }
}
