// HTTP surface: route table and the layers every API route shares
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::{self, AppState};

/// Request body cap: 25MB of attachments, base64 encoded, plus the form.
pub const MAX_BODY_BYTES: usize = 36 * 1024 * 1024;

/// Every `/api/v1` route, with the body limit applied.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/plans", get(handlers::list_plans))
        .route("/api/v1/quote", get(handlers::get_quote))
        .route("/api/v1/holidays/:year", get(handlers::list_holidays))
        .route("/api/v1/lookup/cnpj/:cnpj", get(handlers::lookup_cnpj))
        .route("/api/v1/lookup/cep/:cep", get(handlers::lookup_cep))
        .route("/api/v1/submissions", post(handlers::submit))
        .route("/api/v1/sessions", post(handlers::create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::get_session).patch(handlers::patch_session),
        )
        .route(
            "/api/v1/sessions/:id/equipment",
            post(handlers::add_equipment),
        )
        .route(
            "/api/v1/sessions/:id/equipment/:index",
            delete(handlers::remove_equipment),
        )
        .route(
            "/api/v1/sessions/:id/lookup/cnpj",
            post(handlers::session_lookup_cnpj),
        )
        .route(
            "/api/v1/sessions/:id/lookup/cep",
            post(handlers::session_lookup_cep),
        )
        .route("/api/v1/sessions/:id/submit", post(handlers::submit_session))
        .route("/api/v1/sessions/:id/reset", post(handlers::reset_session))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
}

/// Final app: `/health` next to the given API routes, with tracing and CORS.
/// Layers added to `api` (rate limiting) do not apply to `/health`.
pub fn router(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
