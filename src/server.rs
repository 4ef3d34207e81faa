use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::rate_limit::rate_limit_middleware;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Audits
        .route(
            "/audit",
            post(crate::routes::audit::create_audit).route_layer(
                middleware::from_fn_with_state(state.clone(), rate_limit_middleware),
            ),
        )
        .route("/audits/history", get(crate::routes::reports::audit_history))
        .route("/audits/active", get(crate::routes::reports::active_audits))
        .route(
            "/audits/{id}/report",
            get(crate::routes::reports::audit_report),
        )
        .route("/audits/{id}/{file}", get(crate::routes::reports::audit_file))
        // Logs
        .route("/logs/history", get(crate::routes::logs::log_history))
        .route("/logs/stream", get(crate::routes::logs::log_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
