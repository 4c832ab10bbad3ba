use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use sportmap_shared::errors::{AppError, AppResult};

use crate::filter::FacilityFilter;
use crate::geojson::FeatureCollection;
use crate::models::Facility;
use crate::sports::{distinct_sports, SportsIndex};
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ListingParams {
    pub bounds: Option<String>,
    pub types: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<String>,
}

impl LimitParams {
    fn limit(&self) -> AppResult<i64> {
        let Some(raw) = self.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(DEFAULT_LIMIT);
        };
        raw.parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| AppError::bad_request("limit must be a non-negative integer"))
    }
}

const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Serialize)]
pub struct BoundedListing {
    pub installations: Vec<Facility>,
    pub count: usize,
    pub limit: i64,
}

// --- Full listing (cached) ---

pub async fn list_equipments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListingParams>,
) -> AppResult<Response> {
    let filter = FacilityFilter::from_params(params.bounds.as_deref(), params.types.as_deref())?;
    let key = filter.cache_key();

    if let Some(payload) = state.cache.get(&key).await {
        tracing::debug!(key = %key, "listing served from cache");
        return Ok(json_payload(payload));
    }

    let facilities = state.store.list(&filter)?;
    let payload = serde_json::to_string(&facilities)
        .map_err(|e| AppError::internal(format!("failed to serialize listing: {e}")))?;

    let ttl = Duration::from_secs(state.config.listing_cache_ttl_secs);
    state.cache.put(&key, &payload, ttl).await;
    tracing::debug!(key = %key, count = facilities.len(), "listing cached");

    Ok(json_payload(payload))
}

fn json_payload(payload: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], payload).into_response()
}

// --- GeoJSON export ---

pub async fn export_geojson(State(state): State<Arc<AppState>>) -> (StatusCode, Json<FeatureCollection>) {
    match state.store.list(&FacilityFilter::default()) {
        Ok(facilities) => (StatusCode::OK, Json(FeatureCollection::from_facilities(&facilities))),
        Err(e) => {
            tracing::error!(error = %e, "GeoJSON export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(FeatureCollection::failed(e.to_string())))
        }
    }
}

// --- Distinct sports ---

pub async fn list_sports(State(state): State<Arc<AppState>>) -> AppResult<Json<SportsIndex>> {
    let fields = state.store.sports_fields()?;
    Ok(Json(distinct_sports(fields.iter().map(Option::as_deref))))
}

// --- Bounded listing ---

pub async fn list_installations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<BoundedListing>> {
    let limit = params.limit()?;
    let installations = state.store.list_limited(limit)?;
    Ok(Json(BoundedListing {
        count: installations.len(),
        limit,
        installations,
    }))
}
