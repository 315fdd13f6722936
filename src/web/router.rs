use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::warn;

use crate::{
    modules,
    web::{AppState, auth, uploads},
};

// Uploads are capped at 5MB per file; the limit leaves headroom for the
// remaining multipart framing.
const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state);
    let uploads_dir = state.config().uploads_dir.clone();

    Router::new()
        .route("/health", get(healthz))
        .merge(auth::router())
        .merge(uploads::router())
        .merge(modules::events::router())
        .merge(modules::past_events::router())
        .merge(modules::products::router())
        .merge(modules::orders::router())
        .merge(modules::press::router())
        .merge(modules::stories::router())
        .merge(modules::ideas::router())
        .merge(modules::subscriptions::router())
        .merge(modules::talk_section::router())
        .merge(modules::filters::router())
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    match state.config().frontend_url.parse::<HeaderValue>() {
        Ok(origin) => origins.push(origin),
        Err(err) => warn!(?err, "invalid FRONTEND_URL, skipping CORS origin"),
    }
    if let Ok(dev_origin) = "http://localhost:3001".parse::<HeaderValue>() {
        origins.push(dev_origin);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "OK", "timestamp": Utc::now().to_rfc3339() })),
    )
}
