use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{engagement, liveries, users};

/// GET /health (no auth).
pub async fn health() -> &'static str {
    "ok"
}

/// Every route of the hub. Cross-cutting layers (CORS, tracing) are added by
/// the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/liveries", get(liveries::list_liveries))
        .route("/api/liveries/featured", get(liveries::featured))
        .route("/api/livery/{id}", get(liveries::get_livery))
        .route("/api/livery/{id}/view", post(liveries::record_view))
        .route("/api/users/{id}/stats", get(users::user_stats))
        .route("/api/get-user", get(users::get_user))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/livery/{id}/like", post(engagement::toggle_like))
        .route("/api/livery/{id}/save", post(engagement::toggle_save))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(protected_routes)
}
