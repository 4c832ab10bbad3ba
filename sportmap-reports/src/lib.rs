use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

use config::AppConfig;
use routes::{admin_routes, health, user_routes};
use sportmap_shared::middleware::metrics_middleware;
use store::ReportStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ReportStore>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn app(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/reports", get(admin_routes::list_reports))
        .route(
            "/reports/:id",
            put(admin_routes::update_report).delete(admin_routes::delete_report),
        )
        .route("/stats", get(admin_routes::get_stats))
        .route("/users", get(admin_routes::list_users));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/signalements", post(user_routes::create_report))
        .nest("/admin", admin)
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use sportmap_shared::middleware::{issue_jwt, jwt_secret};
    use sportmap_shared::types::auth::{Claims, UserRole};

    use crate::models::{NewReport, ReportType};
    use crate::store::MemoryReportStore;

    const USER: i32 = 1;
    const ADMIN: i32 = 2;
    const FACILITY: i32 = 47;

    fn seeded() -> (Arc<MemoryReportStore>, Arc<AppState>) {
        let store = Arc::new(MemoryReportStore::new());
        store.add_user(USER, "runner@example.org");
        store.add_admin(ADMIN, "admin@example.org");
        store.add_facility(FACILITY, "Stade municipal");
        let state = Arc::new(AppState {
            config: AppConfig::default(),
            store: store.clone(),
            metrics_handle: None,
        });
        (store, state)
    }

    fn token(id: i32, role: UserRole) -> String {
        let email = if role == UserRole::Admin { "admin@example.org" } else { "runner@example.org" };
        issue_jwt(&Claims::new(id, email, role, 3600), &jwt_secret()).unwrap()
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app(state.clone()).oneshot(request.body(body).unwrap()).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn file_report(store: &MemoryReportStore, kind: ReportType) -> i32 {
        store
            .insert(NewReport::new(USER, FACILITY, "Panneau arraché".into(), None, kind))
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn user_files_a_report_against_a_known_facility() {
        let (store, state) = seeded();
        let user = token(USER, UserRole::User);

        let response = send(
            &state,
            Method::POST,
            "/signalements",
            Some(&user),
            Some(json!({"installation_id": "47", "message": "Filet troué", "type": "Équipement cassé"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["installation"]["name"], "Stade municipal");

        let id = body["data"]["id"].as_i64().unwrap() as i32;
        let report = store.get(id).unwrap().unwrap();
        assert!(report.state.is_new());
        assert_eq!(report.report_type, ReportType::BrokenEquipment);
    }

    #[tokio::test]
    async fn report_against_unknown_facility_is_not_found() {
        let (store, state) = seeded();
        let user = token(USER, UserRole::User);
        let response = send(
            &state,
            Method::POST,
            "/signalements",
            Some(&user),
            Some(json!({"installation_id": 999, "message": "Porte cassée"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(store.count_created(None, None).unwrap(), 0);
    }

    #[tokio::test]
    async fn reports_need_a_token_for_a_live_account() {
        let (store, state) = seeded();
        let body = json!({"installation_id": FACILITY, "message": "Lumières éteintes"});

        let response = send(&state, Method::POST, "/signalements", None, Some(body.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let orphan = token(USER, UserRole::User);
        store.remove_user(USER);
        let response = send(&state, Method::POST, "/signalements", Some(&orphan), Some(body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn back_office_is_admin_only() {
        let (store, state) = seeded();
        let id = file_report(&store, ReportType::Safety);
        let user = token(USER, UserRole::User);

        for uri in ["/admin/reports", "/admin/stats", "/admin/users"] {
            let response = send(&state, Method::GET, uri, Some(&user), None).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
            let response = send(&state, Method::GET, uri, None, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }

        let uri = format!("/admin/reports/{id}");
        let response = send(&state, Method::PUT, &uri, Some(&user), Some(json!({"etat": "Fermé"}))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&state, Method::DELETE, &uri, Some(&user), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let response = send(&state, Method::DELETE, &uri, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let report = store.get(id).unwrap().unwrap();
        assert!(report.state.is_new());
        assert_eq!(report.processed_by, None);
    }

    #[tokio::test]
    async fn admin_rights_follow_the_stored_account() {
        let (store, state) = seeded();
        let id = file_report(&store, ReportType::Safety);
        let admin = token(ADMIN, UserRole::Admin);
        let uri = format!("/admin/reports/{id}");

        store.set_role(ADMIN, UserRole::User);
        let response = send(&state, Method::GET, "/admin/stats", Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "E0005");

        store.remove_user(ADMIN);
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let body = (method == Method::PUT).then(|| json!({"etat": "Fermé"}));
            let target = if method == Method::GET { "/admin/reports" } else { uri.as_str() };
            let response = send(&state, method.clone(), target, Some(&admin), body).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method}");
        }
        let report = store.get(id).unwrap().unwrap();
        assert!(report.state.is_new());
        assert_eq!(report.processed_by, None);
    }

    #[tokio::test]
    async fn far_offset_yields_an_empty_last_page() {
        let (store, state) = seeded();
        file_report(&store, ReportType::Other);
        let admin = token(ADMIN, UserRole::Admin);

        for uri in ["/admin/reports?offset=9223372036854775807", "/admin/users?offset=9223372036854775807"] {
            let response = send(&state, Method::GET, uri, Some(&admin), None).await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let body = body_json(response).await;
            assert_eq!(body["data"]["pagination"]["has_next"], false, "{uri}");
        }
    }

    #[tokio::test]
    async fn admin_triages_a_report() {
        let (store, state) = seeded();
        let id = file_report(&store, ReportType::Degradation);
        let admin = token(ADMIN, UserRole::Admin);

        let response = send(
            &state,
            Method::PUT,
            &format!("/admin/reports/{id}"),
            Some(&admin),
            Some(json!({"etat": "En maintenance", "admin_notes": "Prestataire prévenu"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["previous_state"], "Nouveau");
        assert_eq!(body["data"]["new_state"], "En maintenance");
        assert_eq!(body["data"]["processed_by"], "admin@example.org");

        let listing = body_json(send(&state, Method::GET, "/admin/reports", Some(&admin), None).await).await;
        let item = &listing["data"]["reports"][0];
        assert_eq!(item["state"], "En maintenance");
        assert_eq!(item["processed_by"]["email"], "admin@example.org");
        assert_eq!(item["reporter"]["email"], "runner@example.org");
        assert_eq!(listing["data"]["stats"]["in_maintenance"], 1);
        assert_eq!(listing["data"]["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn unknown_state_is_rejected_before_lookup() {
        let (_, state) = seeded();
        let admin = token(ADMIN, UserRole::Admin);

        let response = send(&state, Method::PUT, "/admin/reports/999", Some(&admin), Some(json!({"etat": "Résolu"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&state, Method::PUT, "/admin/reports/999", Some(&admin), Some(json!({"etat": "Fermé"}))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_filters_by_state_label() {
        let (store, state) = seeded();
        file_report(&store, ReportType::Safety);
        let admin = token(ADMIN, UserRole::Admin);

        let listing = body_json(send(&state, Method::GET, "/admin/reports?etat=Ferm%C3%A9&limit=5", Some(&admin), None).await).await;
        assert_eq!(listing["data"]["reports"].as_array().unwrap().len(), 0);
        assert_eq!(listing["data"]["pagination"]["limit"], 5);

        let response = send(&state, Method::GET, "/admin/reports?type=Inconnu", Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_returns_a_snapshot() {
        let (store, state) = seeded();
        let id = file_report(&store, ReportType::Cleanliness);
        let admin = token(ADMIN, UserRole::Admin);

        let response = send(&state, Method::DELETE, &format!("/admin/reports/{id}"), Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["deleted"]["type"], "Propreté");
        assert_eq!(body["data"]["deleted"]["reporter_email"], "runner@example.org");
        assert_eq!(body["data"]["deleted"]["facility_name"], "Stade municipal");
        assert_eq!(body["data"]["deleted_by"], "admin@example.org");

        let again = send(&state, Method::DELETE, &format!("/admin/reports/{id}"), Some(&admin), None).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_cover_every_label_and_today() {
        let (store, state) = seeded();
        file_report(&store, ReportType::Safety);
        file_report(&store, ReportType::Safety);
        let admin = token(ADMIN, UserRole::Admin);

        let stats = body_json(send(&state, Method::GET, "/admin/stats", Some(&admin), None).await).await;
        let data = &stats["data"];
        assert_eq!(data["by_state"].as_object().unwrap().len(), 6);
        assert_eq!(data["by_state"]["Nouveau"], 2);
        assert_eq!(data["by_type"]["Sécurité"], 2);
        assert_eq!(data["by_type"]["Autre"], 0);
        assert_eq!(data["timeline"]["today"], 2);
        assert_eq!(data["timeline"]["yesterday"], 0);
        assert_eq!(data["timeline"]["total"], 2);
        assert_eq!(data["top_reporters"][0]["email"], "runner@example.org");
        assert_eq!(data["top_facilities"][0]["report_count"], 2);
    }

    #[tokio::test]
    async fn users_listing_carries_recent_reports() {
        let (store, state) = seeded();
        for _ in 0..7 {
            file_report(&store, ReportType::Other);
        }
        let admin = token(ADMIN, UserRole::Admin);

        let listing = body_json(send(&state, Method::GET, "/admin/users", Some(&admin), None).await).await;
        let users = listing["data"]["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["email"], "runner@example.org");
        assert_eq!(users[0]["report_count"], 7);
        assert_eq!(users[0]["recent_reports"].as_array().unwrap().len(), 5);
        assert_eq!(users[0]["recent_reports"][0]["facility_name"], "Stade municipal");
        assert_eq!(listing["data"]["pagination"]["total"], 2);
    }
}
