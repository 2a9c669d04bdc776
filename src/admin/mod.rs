//! Administrative API.
//!
//! Served on its own listener (`admin.bind_address`), never on the public
//! one. Every endpoint requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/apps/{app}/routes", get(get_routes))
        .route("/admin/apps/{app}/routes/rebuild", post(rebuild_routes))
        .route("/admin/apps/{app}/activity", get(get_activity))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
