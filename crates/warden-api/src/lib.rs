//! Warden API - HTTP authentication server
//!
//! Login, second-factor and session endpoints for users and administrators,
//! plus super-admin account management.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{admin, auth as auth_handlers, health, users};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth_handlers::register_handler,
        auth_handlers::login_handler,
        auth_handlers::verify_2fa_handler,
        auth_handlers::logout_handler,
        auth_handlers::admin_login_handler,
        auth_handlers::admin_verify_2fa_handler,
        auth_handlers::admin_logout_handler,
        auth_handlers::admin_logout_all_handler,
        users::me_handler,
        users::update_me_handler,
        admin::me_handler,
        admin::set_user_2fa_handler,
        admin::create_admin_handler,
        admin::list_admins_handler,
        admin::get_admin_handler,
        admin::update_admin_handler,
        admin::delete_admin_handler,
        admin::set_admin_2fa_handler,
        admin::create_auth_profile_handler,
        admin::get_auth_profile_handler,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        auth_handlers::RegisterRequest,
        auth_handlers::LoginRequest,
        auth_handlers::VerifySecondFactorRequest,
        auth_handlers::LoginResponse,
        auth_handlers::TokenResponse,
        auth_handlers::MessageResponse,
        auth_handlers::LogoutAllResponse,
        users::UserResponse,
        users::UpdateProfileRequest,
        admin::AdminResponse,
        admin::CreateAdminRequest,
        admin::UpdateAdminRequest,
        admin::SecondFactorRequest,
        admin::SecondFactorResponse,
        admin::CreateAuthProfileRequest,
        admin::AuthProfileResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "User authentication"),
        (name = "users", description = "User profile"),
        (name = "admin-auth", description = "Administrator authentication"),
        (name = "admin", description = "Administrator management"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .nest("/api", routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
