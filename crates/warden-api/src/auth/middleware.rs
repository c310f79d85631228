//! Authentication middleware for protecting routes
//!
//! Extracts the bearer token from the Authorization header and resolves it
//! through the matching [`AuthService`](super::AuthService). On success the
//! principal ([`User`] or [`Admin`]) and the raw [`BearerToken`] are added to
//! request extensions.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use warden_core::{Admin, AdminRole, User};

use crate::error::AppError;
use crate::state::AppState;

/// The bearer token that authenticated the current request
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

fn bearer_token(request: &Request) -> Result<String, AppError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    Ok(token.to_string())
}

/// Require an active user
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let user: User = state.user_auth.authenticate(&token).await?;

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(BearerToken(token));
    Ok(next.run(request).await)
}

/// Require an active admin with a live session
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let admin: Admin = state.admin_auth.authenticate(&token).await?;

    request.extensions_mut().insert(admin);
    request.extensions_mut().insert(BearerToken(token));
    Ok(next.run(request).await)
}

/// Require a super admin. Must be layered inside [`require_admin`].
pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let admin = request
        .extensions()
        .get::<Admin>()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    if admin.role != AdminRole::SuperAdmin {
        tracing::warn!(id = admin.id, "Super admin route refused");
        return Err(AppError::Forbidden(
            "Super admin privileges required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header_value: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = header_value {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(
            bearer_token(&request_with(Some("Bearer abc.def.ghi"))).unwrap(),
            "abc.def.ghi"
        );
        assert!(bearer_token(&request_with(None)).is_err());
        assert!(bearer_token(&request_with(Some("Basic dXNlcjpwdw=="))).is_err());
        assert!(bearer_token(&request_with(Some("Bearer "))).is_err());
    }
}
