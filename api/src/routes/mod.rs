pub mod auth;
pub mod feed;
pub mod health;
pub mod live;

use std::path::Path;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: AppState, image_dir: &Path) -> Router {
    // Configure CORS; it also covers the read-only image directory
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Public routes (no auth required)
        .route("/", get(health::index))
        .route("/health", get(health::health_check))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        // Protected routes (auth required)
        .route("/auth/me", get(auth::current_user))
        .route("/feed/posts", get(feed::list_posts))
        .route("/feed/post", post(feed::create_post))
        .route(
            "/feed/post/{id}",
            get(feed::get_post)
                .put(feed::update_post)
                .delete(feed::delete_post),
        )
        .route("/feed/live", get(live::feed_events))
        // Locally stored images are served as static assets
        .nest_service("/images", ServeDir::new(image_dir))
        // Add state and middleware
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
