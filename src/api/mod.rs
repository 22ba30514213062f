//! API Routes for the costume studio backend
//!
//! This module combines all API routes into a single router.
//! Routes are organized by resource and apply appropriate middleware.

mod images;
mod merged_images;
pub mod pagination;
pub mod status;
mod tokens;
mod users;

pub use images::UploadResponse;
pub use merged_images::{detail_url, MergeJobResponse};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower::Layer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::{require_user, resolve_user};
use crate::AppState;

/// Room for form fields around the files of one request.
const FORM_OVERHEAD: usize = 64 * 1024;

/// Build the `/api` router.
///
/// Route structure:
/// - / - API root (links to the resources)
/// - /images/* - Uploads (anonymous allowed)
/// - /user/* - Registration and the current user
/// - /token/* - JWT issuance and refresh
/// - /merged-images/* - Merge jobs (sign-in required)
///
/// A bearer token is optional everywhere, but an invalid one is rejected.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .nest("/images", images::routes())
        .nest("/user", users::routes())
        .nest("/token", tokens::routes())
        .nest(
            "/merged-images",
            merged_images::routes().layer(from_fn(require_user)),
        )
        .layer(from_fn_with_state(state, resolve_user))
}

/// Build the complete application: API, redirects, health and media files.
///
/// Trailing slashes are optional on every route, so the links the API
/// hands out (which end in `/`) resolve.
pub fn app(state: AppState) -> Router {
    let normalized = NormalizePathLayer::trim_trailing_slash().layer(router(state));
    Router::new().fallback_service(normalized)
}

fn router(state: AppState) -> Router {
    let media_root = state.media.root().to_path_buf();
    let media_prefix = match state.media.url_prefix().trim_end_matches('/') {
        "" => "/media".to_string(),
        prefix => prefix.to_string(),
    };
    // Two head images plus form fields fit in one merge job request.
    let body_limit = state.media.max_upload_size() * 2 + FORM_OVERHEAD;

    Router::new()
        .route("/", get(redirect_to_api))
        .route("/process", get(redirect_to_api))
        .merge(status::routes())
        .nest("/api", routes(state.clone()))
        .nest_service(&media_prefix, ServeDir::new(media_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn redirect_to_api() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/api/")])
}

/// API root.
///
/// GET /api
async fn api_root(State(state): State<AppState>) -> Json<Value> {
    let base = &state.public_url;
    Json(json!({
        "images": format!("{}/api/images/", base),
        "user": format!("{}/api/user/", base),
        "merged-images": format!("{}/api/merged-images/", base),
    }))
}
