use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let signaling_routes = Router::new()
        .route("/offer", post(handlers::webrtc_offer))
        .route("/ice", post(handlers::webrtc_ice_candidate))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/close", post(handlers::close_session));

    let position_routes = Router::new()
        .route("/position", get(handlers::position))
        .route("/position/:session_id", get(handlers::session_position));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .merge(signaling_routes)
        .merge(position_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
