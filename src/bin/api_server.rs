// HTTP API server binary for sku-intel
// Provides RESTful APIs for the sales-analytics front end

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use sku_intel::ai::client::OpenAiClient;
use sku_intel::ai::query::AnalyticsQueryService;
use sku_intel::api::{ApiServer, AppState};
use sku_intel::mapping::cache::MappingCache;
use sku_intel::mapping::catalog::Catalog;
use sku_intel::mapping::resolver::SkuMapper;
use sku_intel::store::db::Db;
use sku_intel::store::postgres::PgStore;
use sku_intel::store::CatalogStore;
use sku_intel::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    sku_intel::tracing::init_tracing("info,sqlx=warn")?;

    tracing::info!("Initializing sku-intel API server");

    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();

    // Load configuration from environment
    let server = ApiServer::from_env()?;

    // Initialize database connection
    let database_url = env_util::db_url()?;
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
    let db = Db::connect(&database_url, max_connections).await?;

    tracing::info!("Database connected successfully");

    let store: Arc<dyn CatalogStore> = Arc::new(PgStore::new(db));

    // Cache TTL in seconds; 0 disables expiry.
    let ttl_secs: u64 = env_util::env_parse("MAPPING_CACHE_TTL_SECS", 300u64);
    let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
    let cache = Arc::new(MappingCache::new(ttl));

    let model = Arc::new(OpenAiClient::from_env()?);
    let mapper = Arc::new(SkuMapper::new(store.clone(), cache.clone(), model.clone()));
    let catalog = Arc::new(Catalog::new(store.clone(), cache));
    let analytics = Arc::new(AnalyticsQueryService::new(store.clone(), model));

    match mapper.warm_cache().await {
        Ok(warmed) => tracing::info!(warmed, "mapping cache warmed from persisted variants"),
        Err(e) => tracing::warn!(error = %e, "cache warm-up failed; continuing cold"),
    }

    // Start HTTP server
    server
        .run(AppState {
            store,
            mapper,
            catalog,
            analytics,
            started: Instant::now(),
        })
        .await?;

    Ok(())
}
