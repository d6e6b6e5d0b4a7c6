use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coupleconvo::{
    api, auth, cache::CacheConfig, catalog::CatalogSnapshot, catalog::CatalogStore, llm,
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coupleconvo=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CoupleConvo...");

    let auth_config = auth::AuthConfig::from_env();
    let cache_config = CacheConfig::from_env();

    // Question generation is optional
    let llm_config = llm::LlmConfig::from_env();
    let mut catalog = CatalogStore::new();
    match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!("LLM providers initialized successfully");
            catalog = catalog.with_llm(Arc::new(manager), llm_config);
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM providers: {}. Question generation will not be available.",
                e
            );
        }
    }

    if let Some(path) = std::env::var("CATALOG_SEED_PATH")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        let path = PathBuf::from(path);
        let seeded = match CatalogSnapshot::load(&path).await {
            Ok(snapshot) => catalog.import_snapshot(snapshot).await,
            Err(e) => Err(e),
        };
        match seeded {
            Ok(()) => tracing::info!("Catalog seeded from {}", path.display()),
            Err(e) => tracing::error!("Failed to seed catalog from {}: {}", path.display(), e),
        }
    }

    let state = Arc::new(AppState::new(
        catalog,
        cache_config.build_cache(),
        cache_config.category_ttl,
        auth_config,
    ));

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
