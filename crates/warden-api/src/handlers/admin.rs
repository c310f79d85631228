//! Administrator management handlers
//!
//! Account management and authentication profiles are super-admin only.
//! Setting a user's second factor is open to any active admin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;
use warden_core::{
    Admin, AdminChanges, AdminRole, AuthProfile, NewAdmin, NewAuthProfile, SecondFactorSettings,
};

use crate::error::AppError;
use crate::extract::ValidatedJson;
use crate::state::AppState;

/// Administrator information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[schema(value_type = String, example = "super_admin")]
    pub role: AdminRole,
    pub is_active: bool,
    pub enable_2fa: bool,
    pub auth_profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<Admin> for AdminResponse {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id,
            email: admin.email,
            username: admin.username,
            role: admin.role,
            is_active: admin.is_active,
            enable_2fa: admin.enable_2fa,
            auth_profile_id: admin.auth_profile_id,
            created_at: admin.created_at,
        }
    }
}

/// Administrator creation request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAdminRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default)]
    #[schema(value_type = String, example = "admin")]
    pub role: AdminRole,
}

/// Partial administrator update
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateAdminRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[schema(value_type = Option<String>, example = "admin")]
    pub role: Option<AdminRole>,
    pub is_active: Option<bool>,
}

impl From<UpdateAdminRequest> for AdminChanges {
    fn from(request: UpdateAdminRequest) -> Self {
        Self {
            email: request.email,
            username: request.username,
            role: request.role,
            is_active: request.is_active,
        }
    }
}

/// Pagination for admin listing
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Rows to skip
    #[serde(default)]
    pub skip: i64,
    /// Maximum rows to return
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Second-factor settings request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SecondFactorRequest {
    pub enable_2fa: bool,
    /// Required when enabling
    pub auth_profile_id: Option<i64>,
}

/// Second-factor settings response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SecondFactorResponse {
    pub message: String,
    pub id: i64,
    pub enable_2fa: bool,
    pub auth_profile_id: Option<i64>,
}

/// Authentication profile creation request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAuthProfileRequest {
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "corporate-otp")]
    pub name: String,
    #[validate(url)]
    #[schema(example = "https://otp.example.com/verify")]
    pub endpoint: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Authentication profile response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthProfileResponse {
    pub id: i64,
    pub name: String,
    pub endpoint: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AuthProfile> for AuthProfileResponse {
    fn from(profile: AuthProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            endpoint: profile.endpoint,
            is_active: profile.is_active,
            created_at: profile.created_at,
        }
    }
}

/// Check a settings request against the referenced profile
async fn resolve_second_factor(
    state: &AppState,
    request: &SecondFactorRequest,
) -> Result<SecondFactorSettings, AppError> {
    if !request.enable_2fa {
        return Ok(SecondFactorSettings::disabled());
    }

    let profile_id = request.auth_profile_id.ok_or_else(|| {
        AppError::BadRequest(
            "An authentication profile is required to enable second-factor authentication"
                .to_string(),
        )
    })?;

    let profile = state
        .stores
        .profiles
        .find_auth_profile(profile_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Authentication profile not found".to_string()))?;

    if !profile.is_active {
        return Err(AppError::BadRequest(
            "Authentication profile is inactive".to_string(),
        ));
    }

    Ok(SecondFactorSettings {
        enable_2fa: true,
        auth_profile_id: Some(profile.id),
    })
}

// ============================================================================
// Any active admin
// ============================================================================

/// Get the current admin's profile
#[utoipa::path(
    get,
    path = "/api/admin/users/me",
    tag = "admin",
    responses(
        (status = 200, description = "Current admin", body = AdminResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Inactive admin", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(Extension(admin): Extension<Admin>) -> Json<AdminResponse> {
    Json(admin.into())
}

/// Set a user's second-factor settings
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/2fa",
    tag = "admin",
    params(("id" = i64, Path, description = "User id")),
    request_body = SecondFactorRequest,
    responses(
        (status = 200, description = "Settings updated", body = SecondFactorResponse),
        (status = 400, description = "Missing or inactive profile", body = crate::error::ApiError),
        (status = 404, description = "User or profile not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_user_2fa_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Admin>,
    Path(user_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<SecondFactorRequest>,
) -> Result<Json<SecondFactorResponse>, AppError> {
    state
        .stores
        .users
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let settings = resolve_second_factor(&state, &request).await?;
    let user = state
        .stores
        .users
        .set_user_second_factor(user_id, settings)
        .await?;

    tracing::info!(admin = admin.id, user = user.id, enable_2fa = user.enable_2fa, "User second factor updated");
    Ok(Json(SecondFactorResponse {
        message: format!("Second-factor settings updated for user '{}'", user.username),
        id: user.id,
        enable_2fa: user.enable_2fa,
        auth_profile_id: user.auth_profile_id,
    }))
}

// ============================================================================
// Super admin only
// ============================================================================

/// Create an administrator
#[utoipa::path(
    post,
    path = "/api/admin/users",
    tag = "admin",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created", body = AdminResponse),
        (status = 400, description = "Email or username already in use", body = crate::error::ApiError),
        (status = 403, description = "Super admin privileges required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_admin_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password_hash = state.hasher.hash(&request.password)?;
    let admin = state
        .stores
        .admins
        .create_admin(NewAdmin {
            email: request.email,
            username: request.username,
            password_hash,
            role: request.role,
        })
        .await?;

    tracing::info!(id = admin.id, role = %admin.role, "Admin created");
    Ok((StatusCode::CREATED, Json(AdminResponse::from(admin))))
}

/// List administrators ordered by id
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    params(ListParams),
    responses(
        (status = 200, description = "Admins", body = Vec<AdminResponse>),
        (status = 403, description = "Super admin privileges required", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_admins_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AdminResponse>>, AppError> {
    let admins = state
        .stores
        .admins
        .list_admins(params.skip, params.limit)
        .await?;
    Ok(Json(admins.into_iter().map(AdminResponse::from).collect()))
}

/// Get one administrator
#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Admin id")),
    responses(
        (status = 200, description = "Admin", body = AdminResponse),
        (status = 404, description = "Admin not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_admin_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AdminResponse>, AppError> {
    let admin = state
        .stores
        .admins
        .find_admin_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Admin not found".to_string()))?;
    Ok(Json(admin.into()))
}

/// Update an administrator.
///
/// Demoting or deactivating the last active super admin is refused.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Admin id")),
    request_body = UpdateAdminRequest,
    responses(
        (status = 200, description = "Updated admin", body = AdminResponse),
        (status = 400, description = "Duplicate field or last active super admin", body = crate::error::ApiError),
        (status = 404, description = "Admin not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_admin_handler(
    State(state): State<Arc<AppState>>,
    Extension(requester): Extension<Admin>,
    Path(id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateAdminRequest>,
) -> Result<Json<AdminResponse>, AppError> {
    let admin = state
        .stores
        .admins
        .update_admin(id, AdminChanges::from(request))
        .await?;

    tracing::info!(id, by = requester.id, is_active = admin.is_active, "Admin updated");
    Ok(Json(admin.into()))
}

/// Delete an administrator and its sessions
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Admin id")),
    responses(
        (status = 204, description = "Admin deleted"),
        (status = 400, description = "Self deletion or last active super admin", body = crate::error::ApiError),
        (status = 404, description = "Admin not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_admin_handler(
    State(state): State<Arc<AppState>>,
    Extension(requester): Extension<Admin>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.stores.admins.delete_admin(id, requester.id).await?;
    tracing::info!(id, by = requester.id, "Admin deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Set an administrator's second-factor settings
#[utoipa::path(
    put,
    path = "/api/admin/admins/{id}/2fa",
    tag = "admin",
    params(("id" = i64, Path, description = "Admin id")),
    request_body = SecondFactorRequest,
    responses(
        (status = 200, description = "Settings updated", body = SecondFactorResponse),
        (status = 400, description = "Missing or inactive profile", body = crate::error::ApiError),
        (status = 404, description = "Admin or profile not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_admin_2fa_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidatedJson(request): ValidatedJson<SecondFactorRequest>,
) -> Result<Json<SecondFactorResponse>, AppError> {
    state
        .stores
        .admins
        .find_admin_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Admin not found".to_string()))?;

    let settings = resolve_second_factor(&state, &request).await?;
    let admin = state
        .stores
        .admins
        .set_admin_second_factor(id, settings)
        .await?;

    Ok(Json(SecondFactorResponse {
        message: format!("Second-factor settings updated for admin '{}'", admin.username),
        id: admin.id,
        enable_2fa: admin.enable_2fa,
        auth_profile_id: admin.auth_profile_id,
    }))
}

/// Register an external second-factor verifier
#[utoipa::path(
    post,
    path = "/api/admin/auth-profiles",
    tag = "admin",
    request_body = CreateAuthProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = AuthProfileResponse),
        (status = 400, description = "Duplicate profile name", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_auth_profile_handler(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateAuthProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .stores
        .profiles
        .create_auth_profile(NewAuthProfile {
            name: request.name,
            endpoint: request.endpoint,
            is_active: request.is_active,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(AuthProfileResponse::from(profile))))
}

/// Get an authentication profile
#[utoipa::path(
    get,
    path = "/api/admin/auth-profiles/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile", body = AuthProfileResponse),
        (status = 404, description = "Profile not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_auth_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AuthProfileResponse>, AppError> {
    let profile = state
        .stores
        .profiles
        .find_auth_profile(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Authentication profile not found".to_string()))?;
    Ok(Json(profile.into()))
}
