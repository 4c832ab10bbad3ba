use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::types::api::ApiResponse;
use sportmap_shared::types::auth::AuthUser;

use crate::models::{NewReport, ReportType};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub installation_id: Option<Value>,
    pub message: Option<String>,
    pub images_url: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedReport {
    pub id: i32,
    pub installation: ReportedFacility,
}

#[derive(Debug, Serialize)]
pub struct ReportedFacility {
    pub id: i32,
    pub external_code: Option<String>,
    pub name: Option<String>,
}

/// Facility ids arrive as JSON numbers or numeric strings.
fn parse_installation_id(value: Option<&Value>) -> AppResult<i32> {
    let missing = || AppError::bad_request("installation_id and message are required");
    let invalid = || AppError::bad_request("invalid installation id");

    match value {
        None | Some(Value::Null) => Err(missing()),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(invalid),
        Some(Value::String(s)) if s.trim().is_empty() => Err(missing()),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

pub async fn create_report(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateReportRequest>,
) -> AppResult<Json<ApiResponse<CreatedReport>>> {
    // Tokens outliving their account are as good as no token.
    let reporter = state
        .store
        .find_user(auth.id)?
        .ok_or_else(|| AppError::unauthorized("authentication required"))?;

    let installation_id = parse_installation_id(body.installation_id.as_ref())?;
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("installation_id and message are required"))?;
    let report_type = match body.report_type.as_deref() {
        None => ReportType::default(),
        Some(label) => label.parse::<ReportType>()?,
    };

    let facility = state
        .store
        .find_facility(installation_id)?
        .ok_or_else(|| AppError::new(ErrorCode::FacilityNotFound, "facility not found"))?;

    let report = state.store.insert(NewReport::new(
        reporter.id,
        facility.id,
        message,
        body.images_url.filter(|url| !url.trim().is_empty()),
        report_type,
    ))?;

    tracing::info!(
        report_id = report.id,
        user_id = reporter.id,
        installation_id = facility.id,
        report_type = report.report_type.label(),
        "report created"
    );

    Ok(Json(ApiResponse::ok_with_message(
        CreatedReport {
            id: report.id,
            installation: ReportedFacility {
                id: facility.id,
                external_code: facility.external_code,
                name: facility.name,
            },
        },
        "report created",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn installation_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_installation_id(Some(&json!(47))).unwrap(), 47);
        assert_eq!(parse_installation_id(Some(&json!("47"))).unwrap(), 47);
        assert_eq!(parse_installation_id(Some(&json!(0))).unwrap(), 0);
    }

    #[test]
    fn installation_id_rejects_garbage() {
        for value in [json!(null), json!("abc"), json!(1.5), json!([1]), json!(""), json!(i64::MAX)] {
            let err = parse_installation_id(Some(&value)).unwrap_err();
            assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST, "{value}");
        }
        assert!(parse_installation_id(None).is_err());
    }
}
