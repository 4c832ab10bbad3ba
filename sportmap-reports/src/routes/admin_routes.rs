use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sportmap_shared::errors::{AppError, AppResult, ErrorCode};
use sportmap_shared::middleware::AdminUser;
use sportmap_shared::types::api::ApiResponse;
use sportmap_shared::types::pagination::{OffsetParams, PageInfo};

use crate::models::{FacilitySummary, Report, ReportState, ReportType, StateChange, UserSummary};
use crate::store::ReportFilter;
use crate::AppState;

const TOP_LIMIT: i64 = 10;
const RECENT_PER_USER: i64 = 5;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ReportListParams {
    pub etat: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
    pub utilisateur_id: Option<i32>,
    pub installation_id: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ReportListParams {
    fn filter(&self) -> AppResult<ReportFilter> {
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Ok(ReportFilter {
            state: non_empty(&self.etat).map(|s| s.parse()).transpose()?,
            report_type: non_empty(&self.report_type).map(|s| s.parse()).transpose()?,
            user_id: self.utilisateur_id,
            installation_id: self.installation_id,
        })
    }

    fn page(&self) -> OffsetParams {
        let defaults = OffsetParams::default();
        OffsetParams::new(
            self.limit.unwrap_or(defaults.limit),
            self.offset.unwrap_or(defaults.offset),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportRequest {
    pub etat: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportItem {
    pub id: i32,
    pub message: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub state: ReportState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub images_url: Option<String>,
    pub admin_notes: Option<String>,
    pub reporter: Option<UserSummary>,
    pub facility: Option<FacilitySummary>,
    pub processed_by: Option<UserSummary>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StateOverview {
    pub new: i64,
    pub under_review: i64,
    pub in_maintenance: i64,
    pub finished: i64,
}

impl StateOverview {
    fn from_counts(counts: &HashMap<ReportState, i64>) -> Self {
        let n = |state| counts.get(&state).copied().unwrap_or(0);
        Self {
            new: n(ReportState::New),
            under_review: n(ReportState::UnderReview),
            in_maintenance: n(ReportState::InMaintenance),
            finished: n(ReportState::MaintenanceDone) + n(ReportState::Closed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportList {
    pub reports: Vec<ReportItem>,
    pub pagination: PageInfo,
    pub stats: StateOverview,
}

#[derive(Debug, Serialize)]
pub struct ReportUpdate {
    pub id: i32,
    pub previous_state: ReportState,
    pub new_state: ReportState,
    pub admin_notes: Option<String>,
    pub processed_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReportSnapshot {
    pub id: i32,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub reporter_email: Option<String>,
    pub facility_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeletedReport {
    pub deleted: ReportSnapshot,
    pub deleted_by: String,
}

#[derive(Debug, Serialize)]
pub struct Timeline {
    pub today: i64,
    pub yesterday: i64,
    pub last_7_days: i64,
    pub last_30_days: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct TopReporter {
    pub id: i32,
    pub email: Option<String>,
    pub report_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TopFacility {
    pub id: i32,
    pub external_code: Option<String>,
    pub name: Option<String>,
    pub report_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ReportStats {
    pub by_state: BTreeMap<&'static str, i64>,
    pub by_type: BTreeMap<&'static str, i64>,
    pub timeline: Timeline,
    pub top_reporters: Vec<TopReporter>,
    pub top_facilities: Vec<TopFacility>,
}

#[derive(Debug, Serialize)]
pub struct RecentReport {
    pub id: i32,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub state: ReportState,
    pub created_at: DateTime<Utc>,
    pub facility_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserActivity {
    pub id: i32,
    pub email: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub report_count: i64,
    pub recent_reports: Vec<RecentReport>,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<UserActivity>,
    pub pagination: PageInfo,
}

/// The role claim may be stale; the stored account decides admin rights.
fn current_admin(state: &AppState, admin: &AdminUser) -> AppResult<UserSummary> {
    state.store.find_admin(admin.0.id)?.ok_or_else(|| {
        tracing::warn!(user_id = admin.0.id, "admin token no longer backed by an admin account");
        AppError::forbidden("admin access required")
    })
}

fn unique_ids(ids: impl Iterator<Item = i32>) -> Vec<i32> {
    let mut ids: Vec<i32> = ids.collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

// --- List reports (filtered, paginated) ---

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Query(params): Query<ReportListParams>,
) -> AppResult<Json<ApiResponse<ReportList>>> {
    current_admin(&state, &admin)?;
    let filter = params.filter()?;
    let page = params.page();

    let (items, total) = state.store.list(&filter, &page)?;

    let user_ids = unique_ids(
        items
            .iter()
            .flat_map(|r| std::iter::once(r.user_id).chain(r.processed_by)),
    );
    let users: HashMap<i32, UserSummary> = state
        .store
        .users_by_ids(&user_ids)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let facility_ids = unique_ids(items.iter().map(|r| r.installation_id));
    let facilities: HashMap<i32, FacilitySummary> = state
        .store
        .facilities_by_ids(&facility_ids)?
        .into_iter()
        .map(|f| (f.id, f))
        .collect();

    let reports = items
        .into_iter()
        .map(|r: Report| ReportItem {
            reporter: users.get(&r.user_id).cloned(),
            facility: facilities.get(&r.installation_id).cloned(),
            processed_by: r.processed_by.and_then(|id| users.get(&id).cloned()),
            id: r.id,
            message: r.message,
            report_type: r.report_type,
            state: r.state,
            created_at: r.created_at,
            updated_at: r.updated_at,
            images_url: r.images_url,
            admin_notes: r.admin_notes,
        })
        .collect();

    let stats = StateOverview::from_counts(&state.store.count_by_state()?);

    Ok(Json(ApiResponse::ok(ReportList {
        reports,
        pagination: PageInfo::new(total, &page),
        stats,
    })))
}

// --- Update report state ---

pub async fn update_report(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(report_id): Path<i32>,
    Json(body): Json<UpdateReportRequest>,
) -> AppResult<Json<ApiResponse<ReportUpdate>>> {
    let admin = current_admin(&state, &admin)?;

    let new_state: ReportState = body
        .etat
        .as_deref()
        .ok_or_else(|| AppError::new(ErrorCode::InvalidReportState, "etat is required"))?
        .parse()?;

    let previous = state
        .store
        .get(report_id)?
        .ok_or_else(|| AppError::new(ErrorCode::ReportNotFound, "report not found"))?;

    let change = StateChange {
        state: new_state,
        admin_notes: Some(body.admin_notes.unwrap_or_default()),
        processed_by: admin.id,
    };
    let updated = state
        .store
        .update_state(report_id, &change)?
        .ok_or_else(|| AppError::new(ErrorCode::ReportNotFound, "report not found"))?;

    tracing::info!(
        report_id,
        admin = %admin.email,
        from = previous.state.label(),
        to = updated.state.label(),
        "report state changed"
    );

    Ok(Json(ApiResponse::ok_with_message(
        ReportUpdate {
            id: updated.id,
            previous_state: previous.state,
            new_state: updated.state,
            admin_notes: updated.admin_notes,
            processed_by: admin.email,
            updated_at: updated.updated_at,
        },
        "report updated",
    )))
}

// --- Delete report ---

pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(report_id): Path<i32>,
) -> AppResult<Json<ApiResponse<DeletedReport>>> {
    let admin = current_admin(&state, &admin)?;

    let report = state
        .store
        .get(report_id)?
        .ok_or_else(|| AppError::new(ErrorCode::ReportNotFound, "report not found"))?;

    let reporter_email = state.store.find_user(report.user_id)?.map(|u| u.email);
    let facility_name = state
        .store
        .find_facility(report.installation_id)?
        .and_then(|f| f.name);

    if !state.store.delete(report_id)? {
        return Err(AppError::new(ErrorCode::ReportNotFound, "report not found"));
    }

    tracing::info!(report_id, admin = %admin.email, "report deleted");

    Ok(Json(ApiResponse::ok_with_message(
        DeletedReport {
            deleted: ReportSnapshot {
                id: report.id,
                report_type: report.report_type,
                reporter_email,
                facility_name,
                created_at: report.created_at,
            },
            deleted_by: admin.email,
        },
        "report deleted",
    )))
}

// --- Aggregate statistics ---

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> AppResult<Json<ApiResponse<ReportStats>>> {
    current_admin(&state, &admin)?;
    let store = &state.store;

    let per_state = store.count_by_state()?;
    let by_state = ReportState::ALL
        .iter()
        .map(|s| (s.label(), per_state.get(s).copied().unwrap_or(0)))
        .collect();

    let per_type = store.count_by_type()?;
    let by_type = ReportType::ALL
        .iter()
        .map(|t| (t.label(), per_type.get(t).copied().unwrap_or(0)))
        .collect();

    let today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
    let timeline = Timeline {
        today: store.count_created(Some(today), None)?,
        yesterday: store.count_created(Some(today - Duration::days(1)), Some(today))?,
        last_7_days: store.count_created(Some(today - Duration::days(7)), None)?,
        last_30_days: store.count_created(Some(today - Duration::days(30)), None)?,
        total: store.count_created(None, None)?,
    };

    let reporter_counts = store.top_reporters(TOP_LIMIT)?;
    let emails: HashMap<i32, String> = store
        .users_by_ids(&reporter_counts.iter().map(|(id, _)| *id).collect::<Vec<_>>())?
        .into_iter()
        .map(|u| (u.id, u.email))
        .collect();
    let top_reporters = reporter_counts
        .into_iter()
        .map(|(id, report_count)| TopReporter {
            id,
            email: emails.get(&id).cloned(),
            report_count,
        })
        .collect();

    let facility_counts = store.top_facilities(TOP_LIMIT)?;
    let facilities: HashMap<i32, FacilitySummary> = store
        .facilities_by_ids(&facility_counts.iter().map(|(id, _)| *id).collect::<Vec<_>>())?
        .into_iter()
        .map(|f| (f.id, f))
        .collect();
    let top_facilities = facility_counts
        .into_iter()
        .map(|(id, report_count)| {
            let facility = facilities.get(&id);
            TopFacility {
                id,
                external_code: facility.and_then(|f| f.external_code.clone()),
                name: facility.and_then(|f| f.name.clone()),
                report_count,
            }
        })
        .collect();

    Ok(Json(ApiResponse::ok(ReportStats {
        by_state,
        by_type,
        timeline,
        top_reporters,
        top_facilities,
    })))
}

// --- Users with their latest reports ---

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Query(page): Query<OffsetParams>,
) -> AppResult<Json<ApiResponse<UserList>>> {
    current_admin(&state, &admin)?;
    let (ranked, total) = state.store.users_by_activity(&page)?;

    let mut recent: Vec<Vec<Report>> = Vec::with_capacity(ranked.len());
    for (user, _) in &ranked {
        recent.push(state.store.recent_for_user(user.id, RECENT_PER_USER)?);
    }

    let facility_ids = unique_ids(recent.iter().flatten().map(|r| r.installation_id));
    let names: HashMap<i32, Option<String>> = state
        .store
        .facilities_by_ids(&facility_ids)?
        .into_iter()
        .map(|f| (f.id, f.name))
        .collect();

    let users = ranked
        .into_iter()
        .zip(recent)
        .map(|((user, report_count), reports)| UserActivity {
            id: user.id,
            email: user.email,
            is_verified: user.is_verified,
            created_at: user.created_at,
            report_count,
            recent_reports: reports
                .into_iter()
                .map(|r| RecentReport {
                    id: r.id,
                    report_type: r.report_type,
                    state: r.state,
                    created_at: r.created_at,
                    facility_name: names.get(&r.installation_id).cloned().flatten(),
                })
                .collect(),
        })
        .collect();

    Ok(Json(ApiResponse::ok(UserList {
        users,
        pagination: PageInfo::new(total, &page),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_counts_done_and_closed_but_not_rejected() {
        let counts = HashMap::from([
            (ReportState::New, 4),
            (ReportState::MaintenanceDone, 2),
            (ReportState::Closed, 1),
            (ReportState::Rejected, 7),
        ]);
        assert_eq!(
            StateOverview::from_counts(&counts),
            StateOverview { new: 4, under_review: 0, in_maintenance: 0, finished: 3 }
        );
    }

    #[test]
    fn blank_filters_are_ignored_and_unknown_labels_rejected() {
        let params = ReportListParams {
            etat: Some(" ".into()),
            report_type: Some("Sécurité".into()),
            utilisateur_id: None,
            installation_id: Some(3),
            limit: Some(500),
            offset: None,
        };
        let filter = params.filter().unwrap();
        assert_eq!(filter.state, None);
        assert_eq!(filter.report_type, Some(ReportType::Safety));
        assert_eq!(params.page().limit(), 200);

        let params = ReportListParams { etat: Some("Archivé".into()), ..params };
        assert!(params.filter().is_err());
    }
}
