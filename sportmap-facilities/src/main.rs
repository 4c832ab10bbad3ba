use std::sync::Arc;

use sportmap_facilities::cache::{ListingCache, MemoryListingCache, RedisListingCache};
use sportmap_facilities::config::{AppConfig, CacheBackend};
use sportmap_facilities::store::PgFacilityStore;
use sportmap_facilities::{app, AppState};
use sportmap_shared::clients::db::create_pool;
use sportmap_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sportmap_shared::middleware::init_tracing("sportmap-facilities");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = sportmap_shared::middleware::init_metrics()?;

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    let store = Arc::new(PgFacilityStore::new(pool));

    let cache: Arc<dyn ListingCache> = match config.listing_cache {
        CacheBackend::Redis => {
            let redis = RedisClient::connect(&config.redis_url).await?;
            Arc::new(RedisListingCache::new(redis))
        }
        CacheBackend::Memory => Arc::new(MemoryListingCache::new()),
    };
    tracing::info!(backend = ?config.listing_cache, ttl_secs = config.listing_cache_ttl_secs, "listing cache ready");

    let state = Arc::new(AppState {
        config,
        store,
        cache,
        metrics_handle: Some(metrics_handle),
    });

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "sportmap-facilities starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
