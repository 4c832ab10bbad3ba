use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod config;
pub mod filter;
pub mod geojson;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod schema;
pub mod sports;
pub mod store;

use cache::ListingCache;
use config::AppConfig;
use sportmap_shared::middleware::metrics_middleware;
use store::FacilityStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn FacilityStore>,
    pub cache: Arc<dyn ListingCache>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/equipments", get(routes::facilities::list_equipments))
        .route("/geojson", get(routes::facilities::export_geojson))
        .route("/sports", get(routes::facilities::list_sports))
        .route("/installations", get(routes::facilities::list_installations))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
