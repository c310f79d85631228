//! Authentication API handlers
//!
//! Login, second-factor verification and logout for both principal kinds.
//! The two surfaces share request and response shapes; admin responses
//! additionally carry the admin role once a full token is issued.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;
use warden_core::{Admin, AdminRole, NewUser, Principal};

use crate::auth::{BearerToken, IssuedToken, LoginOutcome};
use crate::error::AppError;
use crate::extract::ValidatedJson;
use crate::handlers::users::UserResponse;
use crate::state::AppState;

const TOKEN_TYPE: &str = "bearer";

/// User registration request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[validate(length(min = 3, max = 50))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

/// Second-factor verification request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifySecondFactorRequest {
    /// Temp token returned by login
    #[validate(length(min = 1))]
    pub temp_token: String,
    /// Credential checked by the external verifier
    pub password: String,
}

/// Login response.
///
/// Exactly one of `access_token` and `temp_token` is set.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: Option<String>,
    pub temp_token: Option<String>,
    pub requires_2fa: bool,
    pub message: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "super_admin")]
    pub role: Option<AdminRole>,
}

impl<P: Principal> From<LoginOutcome<P>> for LoginResponse {
    fn from(outcome: LoginOutcome<P>) -> Self {
        match outcome {
            LoginOutcome::Authenticated { principal, token } => Self {
                access_token: Some(token.token),
                temp_token: None,
                requires_2fa: false,
                message: "Login successful".to_string(),
                token_type: TOKEN_TYPE.to_string(),
                expires_in: token.expires_in,
                role: principal.role(),
            },
            LoginOutcome::SecondFactorRequired { temp_token, .. } => Self {
                access_token: None,
                temp_token: Some(temp_token.token),
                requires_2fa: true,
                message: "Second-factor authentication required; complete it at verify-2fa"
                    .to_string(),
                token_type: TOKEN_TYPE.to_string(),
                expires_in: temp_token.expires_in,
                // Not disclosed until the second factor passes
                role: None,
            },
        }
    }
}

/// Access token response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "admin")]
    pub role: Option<AdminRole>,
}

impl TokenResponse {
    fn new(token: IssuedToken, role: Option<AdminRole>) -> Self {
        Self {
            access_token: token.token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: token.expires_in,
            role,
        }
    }
}

/// Plain message response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Logout-everywhere response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutAllResponse {
    pub message: String,
    pub sessions_removed: u64,
}

// ============================================================================
// User surface
// ============================================================================

/// Register a new user account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Email or username already in use", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password_hash = state.hasher.hash(&request.password)?;
    let user = state
        .stores
        .users
        .create_user(NewUser {
            email: request.email,
            username: request.username,
            password_hash,
        })
        .await?;

    tracing::info!(id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token, or temp token when 2FA is required", body = LoginResponse),
        (status = 401, description = "Incorrect email or password", body = crate::error::ApiError),
        (status = 403, description = "Inactive user", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state
        .user_auth
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(outcome.into()))
}

/// Complete login with the second factor
#[utoipa::path(
    post,
    path = "/api/auth/verify-2fa",
    tag = "auth",
    request_body = VerifySecondFactorRequest,
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Second factor not configured", body = crate::error::ApiError),
        (status = 401, description = "Invalid temp token or rejected second factor", body = crate::error::ApiError),
    )
)]
pub async fn verify_2fa_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<VerifySecondFactorRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let (_, token) = state
        .user_auth
        .verify_second_factor(&request.temp_token, &request.password)
        .await?;
    Ok(Json(TokenResponse::new(token, None)))
}

/// Logout.
///
/// User tokens are stateless, so this only tells the client to discard its
/// token; the token itself stays valid until it expires.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = token {
        state.user_auth.logout(token).await?;
    }
    Ok(Json(MessageResponse::new("Logged out")))
}

// ============================================================================
// Admin surface
// ============================================================================

/// Admin login; records a server-side session
#[utoipa::path(
    post,
    path = "/api/admin/auth/login",
    tag = "admin-auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token, or temp token when 2FA is required", body = LoginResponse),
        (status = 401, description = "Incorrect email or password", body = crate::error::ApiError),
        (status = 403, description = "Inactive admin", body = crate::error::ApiError),
    )
)]
pub async fn admin_login_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state
        .admin_auth
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(outcome.into()))
}

/// Complete admin login with the second factor
#[utoipa::path(
    post,
    path = "/api/admin/auth/verify-2fa",
    tag = "admin-auth",
    request_body = VerifySecondFactorRequest,
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Second factor not configured", body = crate::error::ApiError),
        (status = 401, description = "Invalid temp token or rejected second factor", body = crate::error::ApiError),
        (status = 403, description = "Inactive admin", body = crate::error::ApiError),
    )
)]
pub async fn admin_verify_2fa_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<VerifySecondFactorRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let (admin, token) = state
        .admin_auth
        .verify_second_factor(&request.temp_token, &request.password)
        .await?;
    Ok(Json(TokenResponse::new(token, Some(admin.role))))
}

/// Admin logout; deletes the session behind the presented token
#[utoipa::path(
    post,
    path = "/api/admin/auth/logout",
    tag = "admin-auth",
    responses(
        (status = 200, description = "Session deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<BearerToken>,
) -> Result<Json<MessageResponse>, AppError> {
    state.admin_auth.logout(&token.0).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// Delete every session of the calling admin
#[utoipa::path(
    post,
    path = "/api/admin/auth/logout-all",
    tag = "admin-auth",
    responses(
        (status = 200, description = "All sessions deleted", body = LogoutAllResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_logout_all_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Admin>,
) -> Result<Json<LogoutAllResponse>, AppError> {
    let sessions_removed = state.admin_auth.logout_everywhere(&admin).await?;
    Ok(Json(LogoutAllResponse {
        message: "Logged out from all sessions".to_string(),
        sessions_removed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_core::{Admin, User};

    fn issued(token: &str) -> IssuedToken {
        IssuedToken {
            token: token.to_string(),
            expires_at: Utc::now(),
            expires_in: 300,
        }
    }

    fn user() -> User {
        User {
            id: 1,
            email: "a@example.com".to_string(),
            username: "alice".to_string(),
            password_hash: String::new(),
            is_active: true,
            enable_2fa: true,
            auth_profile_id: Some(1),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_login_response_for_second_factor() {
        let response = LoginResponse::from(LoginOutcome::SecondFactorRequired {
            principal: user(),
            temp_token: issued("temp"),
        });

        assert!(response.requires_2fa);
        assert_eq!(response.temp_token.as_deref(), Some("temp"));
        assert!(response.access_token.is_none());

        // Users carry no role, so the field is omitted entirely
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("role").is_none());
    }

    #[test]
    fn test_login_response_for_full_token() {
        let response = LoginResponse::from(LoginOutcome::Authenticated {
            principal: user(),
            token: issued("access"),
        });

        assert!(!response.requires_2fa);
        assert_eq!(response.access_token.as_deref(), Some("access"));
        assert_eq!(response.token_type, "bearer");
    }

    #[test]
    fn test_admin_role_hidden_until_second_factor_passes() {
        let admin = Admin {
            id: 1,
            email: "root@example.com".to_string(),
            username: "root".to_string(),
            password_hash: String::new(),
            role: AdminRole::SuperAdmin,
            is_active: true,
            enable_2fa: true,
            auth_profile_id: Some(1),
            created_at: Utc::now(),
            updated_at: None,
        };

        let pending = LoginResponse::from(LoginOutcome::SecondFactorRequired {
            principal: admin.clone(),
            temp_token: issued("temp"),
        });
        let json = serde_json::to_value(&pending).unwrap();
        assert!(json.get("role").is_none());

        let full = LoginResponse::from(LoginOutcome::Authenticated {
            principal: admin,
            token: issued("access"),
        });
        assert_eq!(full.role, Some(AdminRole::SuperAdmin));
    }

    #[test]
    fn test_register_request_validation() {
        let bad = RegisterRequest {
            email: "not-an-email".to_string(),
            username: "al".to_string(),
            password: "short".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
    }
}
