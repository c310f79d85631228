//! API route definitions

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::auth::{require_admin, require_super_admin, require_user};
use crate::handlers::{admin, auth, health, users};
use crate::state::AppState;

/// Create `/api` routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/verify-2fa", post(auth::verify_2fa_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/admin/auth/login", post(auth::admin_login_handler))
        .route("/admin/auth/verify-2fa", post(auth::admin_verify_2fa_handler));

    // Active users
    let user_routes = Router::new()
        .route(
            "/users/me",
            get(users::me_handler).put(users::update_me_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    // Active admins with a live session
    let admin_routes = Router::new()
        .route("/admin/auth/logout", post(auth::admin_logout_handler))
        .route("/admin/auth/logout-all", post(auth::admin_logout_all_handler))
        .route("/admin/users/me", get(admin::me_handler))
        // Path params share the `:id` name with the super-admin routes below
        .route("/admin/users/:id/2fa", put(admin::set_user_2fa_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Super admins; layers run bottom-up, so the admin check comes first
    let super_admin_routes = Router::new()
        .route(
            "/admin/users",
            post(admin::create_admin_handler).get(admin::list_admins_handler),
        )
        .route(
            "/admin/users/:id",
            get(admin::get_admin_handler)
                .put(admin::update_admin_handler)
                .delete(admin::delete_admin_handler),
        )
        .route("/admin/admins/:id/2fa", put(admin::set_admin_2fa_handler))
        .route("/admin/auth-profiles", post(admin::create_auth_profile_handler))
        .route("/admin/auth-profiles/:id", get(admin::get_auth_profile_handler))
        .route_layer(middleware::from_fn(require_super_admin))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .merge(super_admin_routes)
}
