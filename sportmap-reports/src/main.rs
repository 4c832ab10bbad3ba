use std::sync::Arc;

use sportmap_reports::config::AppConfig;
use sportmap_reports::store::PgReportStore;
use sportmap_reports::{app, AppState};
use sportmap_shared::clients::db::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sportmap_shared::middleware::init_tracing("sportmap-reports");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = sportmap_shared::middleware::init_metrics()?;

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    let state = Arc::new(AppState {
        config,
        store: Arc::new(PgReportStore::new(pool)),
        metrics_handle: Some(metrics_handle),
    });

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "sportmap-reports starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
