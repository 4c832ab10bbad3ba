use std::sync::Arc;

use sportmap_auth::config::AppConfig;
use sportmap_auth::store::PgUserStore;
use sportmap_auth::{app, AppState};
use sportmap_shared::clients::db::create_pool;
use sportmap_shared::clients::email::BrevoClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sportmap_shared::middleware::init_tracing("sportmap-auth");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = sportmap_shared::middleware::init_metrics()?;

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    let mailer = BrevoClient::new(&config.brevo_api_key, &config.from_email, &config.from_name);

    let state = Arc::new(AppState {
        users: Arc::new(PgUserStore::new(pool)),
        mailer: Arc::new(mailer),
        config,
        metrics_handle: Some(metrics_handle),
    });

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "sportmap-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
