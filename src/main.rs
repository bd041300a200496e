use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use movie_tracker::{
    config::{BackendKind, Config},
    db::{
        create_pool, create_redis_client, run_migrations, Cache, FileBackend, MemoryBackend,
        PostgresBackend,
    },
    routes::{create_router, AppState},
    services::{providers::TmdbProvider, Catalog, StoreRegistry, TrackingBackend},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("movie_tracker=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let backend = build_backend(&config).await?;
    let registry = Arc::new(StoreRegistry::new(
        backend,
        config.notification_duration(),
        config.store_capacity,
    ));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client);
    let provider = Arc::new(TmdbProvider::new(
        cache,
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    ));
    let catalog = Catalog::new(provider);

    let state = AppState {
        catalog,
        registry: Arc::clone(&registry),
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, backend = registry.backend_name(), "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_handle.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn TrackingBackend>> {
    let backend: Arc<dyn TrackingBackend> = match config.backend_kind()? {
        BackendKind::File => Arc::new(FileBackend::new(config.data_dir.clone()).await?),
        BackendKind::Postgres => {
            let pool = create_pool(&config.database_url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            run_migrations(&pool).await?;
            Arc::new(PostgresBackend::new(pool))
        }
        BackendKind::Memory => {
            tracing::warn!("Memory tracking backend selected, data will not survive a restart");
            Arc::new(MemoryBackend::new())
        }
    };

    Ok(backend)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
