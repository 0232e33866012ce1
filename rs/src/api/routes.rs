/*
 * Responsibility
 * - URL layout of the resource server
 * - /health stays public; /api/resource goes through the DPoP access middleware (route_layer)
 */
use axum::{Router, middleware::from_fn_with_state, routing::get};

use crate::api::handlers::{health::health, resource::get_resource};
use crate::middleware::auth::access::access_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/resource", get(get_resource))
        .route_layer(from_fn_with_state(state, access_middleware));

    Router::new().route("/health", get(health)).merge(protected)
}
