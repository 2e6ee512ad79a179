use crate::{handlers, media::VIDEO_MAX_BYTES, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// Largest accepted file plus room for the other multipart fields.
const BODY_LIMIT: usize = (VIDEO_MAX_BYTES as usize) + 1024 * 1024;

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/memes", get(handlers::list_memes))
        .route("/memes/refresh", post(handlers::refresh_memes))
        .route("/memes/clear", post(handlers::clear_memes))
        .route("/upload_meme", post(handlers::upload_meme))
        .route("/memes/{id}", delete(handlers::delete_meme))
        .route("/memes/{id}/like", post(handlers::like_meme))
        .route("/memes/{id}/comments", get(handlers::list_comments).post(handlers::add_comment))
        .route("/memes/{id}/comments/toggle", post(handlers::toggle_comments))
        .route("/memes/{id}/share", post(handlers::share_meme))
        .route("/media/{*key}", get(handlers::get_media))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
