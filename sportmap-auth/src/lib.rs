use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

use config::AppConfig;
use sportmap_shared::clients::email::Mailer;
use sportmap_shared::middleware::metrics_middleware;
use store::UserStore;

pub struct AppState {
    pub config: AppConfig,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/register", post(routes::register::register))
        .route("/login", post(routes::login::login))
        .route("/verify-code", post(routes::verify_code::verify_code))
        .route("/resend-verification-code", post(routes::resend_code::resend_code))
        .route("/request-password-reset", post(routes::password_reset::request_password_reset))
        .route("/reset-password", post(routes::password_reset::reset_password))
        .route("/validate-reset-token", get(routes::password_reset::validate_reset_token))
        .route("/me", get(routes::me::me))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
