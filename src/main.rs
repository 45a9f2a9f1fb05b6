use std::net::SocketAddr;
use std::sync::Arc;

use nutribuddy_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache, PgStore, Store},
    services::{Catalog, OpenAiExtractor, PropagationQueue, RecommendationService, RecommenderSettings},
};

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "nutribuddy_api=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    let pool = create_pool(&config.database_url).await?;
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::warn!(error = %e, "Migration failed; continuing");
    }
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::spawn(redis_client);

    let catalog = Arc::new(Catalog::load(&config.catalog_path)?);
    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; disease extraction will return no diseases");
    }
    let extractor = Arc::new(
        OpenAiExtractor::new(
            catalog.clone(),
            config.openai_api_key.clone(),
            config.openai_api_url.clone(),
            config.openai_model.clone(),
            config.extraction_timeout(),
        )
        .with_cache(cache),
    );

    let recommendations = RecommendationService::new(store.clone(), RecommenderSettings::from(&config));
    let (propagation, propagation_workers) = PropagationQueue::start(
        recommendations.clone(),
        config.propagation_workers,
        config.propagation_queue_capacity,
    );

    let state = AppState::new(store, recommendations, propagation, extractor, catalog);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(%addr, "Server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    propagation_workers.shutdown().await;
    cache_writer.shutdown().await;

    Ok(())
}
