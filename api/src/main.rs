use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use feed_api::{
    config::Config,
    images::{ImageStore, LocalImageStore, RemoteImageStore},
    notifier, routes,
    state::AppState,
    storage::MemoryStore,
};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .compact()
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env();

    // The broadcast channel exists before the first request can publish
    let notifier = notifier::init(config.broadcast_capacity)
        .expect("realtime notifier initialized twice")
        .clone();

    let images: Arc<dyn ImageStore> = match &config.image_host {
        Some(host) => {
            info!("Using remote image host at {}", host.base_url);
            Arc::new(RemoteImageStore::new(
                host.base_url.clone(),
                host.api_key.clone(),
            ))
        }
        None => {
            info!("Storing images locally under {}", config.image_dir.display());
            Arc::new(
                LocalImageStore::new(config.image_dir.clone(), config.public_url.clone())
                    .expect("image directory must be writable"),
            )
        }
    };

    let state = AppState {
        store: Arc::new(MemoryStore::new()),
        images,
        notifier,
        jwt_secret: config.jwt_secret.clone(),
        page_size: config.page_size,
    };

    let app = routes::router(state, &config.image_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");

    info!("Server running on http://{}", addr);
    info!("API Endpoints:");
    info!("  POST   /auth/signup       - Create account");
    info!("  POST   /auth/login        - Login");
    info!("  GET    /auth/me           - Current user (auth)");
    info!("  GET    /feed/posts        - List posts (auth, paginated)");
    info!("  POST   /feed/post         - Create post (auth, multipart)");
    info!("  GET    /feed/post/:id     - Get post (auth)");
    info!("  PUT    /feed/post/:id     - Update post (auth, owner only)");
    info!("  DELETE /feed/post/:id     - Delete post (auth, owner only)");
    info!("  GET    /feed/live         - Realtime feed events (websocket)");

    axum::serve(listener, app).await.expect("server error");
}
