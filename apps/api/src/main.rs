use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use btecify_api::config::Config;
use btecify_api::repositories::LibraryRepository;
use btecify_api::routes::{
    health_router, jobs_router, library_router, streaming_router, HealthState, JobsState,
    LibraryState, StreamingState,
};
use btecify_api::services::{
    clear_extraction_dir, DownloadService, Extractor, HealthService, LibraryService,
    PayloadStore, YtDlpExtractor,
};
use btecify_jobs::{spawn_sweeper, JobRegistry};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the CORS layer based on configuration.
///
/// In production only the origins in `CORS_ORIGINS` are allowed (none if it
/// is unset). In development an unset `CORS_ORIGINS` means permissive CORS.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                return CorsLayer::new();
            }

            tracing::info!(
                "CORS configured with {} allowed origin(s): {:?}",
                allowed_origins.len(),
                origins
            );
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::RANGE])
                .expose_headers([header::CONTENT_RANGE, header::ACCEPT_RANGES, header::ETAG])
                .max_age(std::time::Duration::from_secs(3600))
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!("Using permissive CORS in development mode");
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "btecify_api=debug,btecify_jobs=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Starting Btecify API server on port {}", config.port);

    let database = config.database();
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(database.connect_timeout())
        .idle_timeout(database.idle_timeout())
        .connect(&database.url)
        .await?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    let extraction = config.extraction().clone();
    let removed = clear_extraction_dir(&extraction.dir).await?;
    if removed > 0 {
        tracing::info!(removed, dir = %extraction.dir.display(), "Cleared leftover extraction files");
    }

    let storage = PayloadStore::new(extraction.storage_dir.clone());
    storage.ensure_root().await?;

    let extractor: Arc<dyn Extractor> = Arc::new(YtDlpExtractor::new(extraction));
    if !extractor.is_available().await {
        tracing::warn!("yt-dlp is not available; downloads will fail until it is installed");
    }

    let registry = JobRegistry::new(config.sweep_policy());
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(registry.clone(), shutdown.clone());

    let repo = LibraryRepository::new(pool.clone());
    let library = LibraryService::new(repo.clone(), storage.clone());
    let downloads = DownloadService::new(
        registry.clone(),
        repo.clone(),
        storage.clone(),
        Arc::clone(&extractor),
    );

    let api = Router::new()
        .nest(
            "/jobs",
            jobs_router(JobsState::new(registry.clone(), config.poll_interval())),
        )
        .merge(library_router(LibraryState::new(library, downloads)))
        .merge(streaming_router(StreamingState::new(repo, storage)));

    let health_state = HealthState::new(HealthService::new(pool, registry, extractor));

    let app = Router::new()
        .route("/", get(root))
        .nest("/health", health_router(health_state))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    sweeper.await?;
    tracing::info!("Server stopped");

    Ok(())
}

/// Resolve on Ctrl+C and stop background tasks
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

async fn root() -> &'static str {
    "Welcome to Btecify"
}
