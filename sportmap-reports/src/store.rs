use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use diesel::dsl::{count, count_star};
use diesel::pg::Pg;
use diesel::prelude::*;

use sportmap_shared::clients::db::{DbConn, DbPool};
use sportmap_shared::errors::{AppError, AppResult};
use sportmap_shared::types::auth::UserRole;
use sportmap_shared::types::pagination::OffsetParams;

use crate::models::{
    FacilitySummary, NewReport, Report, ReportRow, ReportState, ReportType, StateChange,
    UserRecord, UserSummary,
};
use crate::schema::{installations, reports, users};

/// Admin list filters; all present filters must hold.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub state: Option<ReportState>,
    pub report_type: Option<ReportType>,
    pub user_id: Option<i32>,
    pub installation_id: Option<i32>,
}

impl ReportFilter {
    fn matches(&self, report: &Report) -> bool {
        self.state.map_or(true, |s| report.state == s)
            && self.report_type.map_or(true, |t| report.report_type == t)
            && self.user_id.map_or(true, |u| report.user_id == u)
            && self.installation_id.map_or(true, |i| report.installation_id == i)
    }
}

/// Reports plus the read-only slices of users and facilities they reference.
/// Calls are blocking.
pub trait ReportStore: Send + Sync {
    fn find_user(&self, id: i32) -> AppResult<Option<UserSummary>>;
    /// The user, only while their stored role is still admin.
    fn find_admin(&self, id: i32) -> AppResult<Option<UserSummary>>;
    fn find_facility(&self, id: i32) -> AppResult<Option<FacilitySummary>>;
    fn users_by_ids(&self, ids: &[i32]) -> AppResult<Vec<UserSummary>>;
    fn facilities_by_ids(&self, ids: &[i32]) -> AppResult<Vec<FacilitySummary>>;

    fn insert(&self, report: NewReport) -> AppResult<Report>;
    fn get(&self, id: i32) -> AppResult<Option<Report>>;

    /// Newest first, with the total matching count.
    fn list(&self, filter: &ReportFilter, page: &OffsetParams) -> AppResult<(Vec<Report>, i64)>;

    /// Refreshes `updated_at`. `None` if the report does not exist.
    fn update_state(&self, id: i32, change: &StateChange) -> AppResult<Option<Report>>;
    fn delete(&self, id: i32) -> AppResult<bool>;

    fn count_by_state(&self) -> AppResult<HashMap<ReportState, i64>>;
    fn count_by_type(&self) -> AppResult<HashMap<ReportType, i64>>;

    /// Reports created in `[since, until)`; open ends are unbounded.
    fn count_created(&self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> AppResult<i64>;

    /// `(user_id, report_count)`, most active first.
    fn top_reporters(&self, limit: i64) -> AppResult<Vec<(i32, i64)>>;
    /// `(installation_id, report_count)`, most reported first.
    fn top_facilities(&self, limit: i64) -> AppResult<Vec<(i32, i64)>>;

    /// Every user with their report count, most active first, and the user total.
    fn users_by_activity(&self, page: &OffsetParams) -> AppResult<(Vec<(UserRecord, i64)>, i64)>;
    fn recent_for_user(&self, user_id: i32, limit: i64) -> AppResult<Vec<Report>>;
}

// --- PostgreSQL ---

pub struct PgReportStore {
    pool: DbPool,
}

impl PgReportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<DbConn> {
        self.pool
            .get()
            .map_err(|e| AppError::internal(format!("db pool error: {e}")))
    }

    fn filtered(filter: &ReportFilter) -> reports::BoxedQuery<'static, Pg> {
        let mut query = reports::table.into_boxed();
        if let Some(state) = filter.state {
            query = query.filter(reports::state.eq(state.label()));
        }
        if let Some(kind) = filter.report_type {
            query = query.filter(reports::report_type.eq(kind.label()));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(reports::user_id.eq(user_id));
        }
        if let Some(installation_id) = filter.installation_id {
            query = query.filter(reports::installation_id.eq(installation_id));
        }
        query
    }
}

fn into_reports(rows: Vec<ReportRow>) -> AppResult<Vec<Report>> {
    rows.into_iter().map(Report::try_from).collect()
}

impl ReportStore for PgReportStore {
    fn find_user(&self, id: i32) -> AppResult<Option<UserSummary>> {
        let mut conn = self.conn()?;
        let user = users::table
            .find(id)
            .select(UserSummary::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn find_admin(&self, id: i32) -> AppResult<Option<UserSummary>> {
        let mut conn = self.conn()?;
        let admin = users::table
            .find(id)
            .filter(users::role.eq(UserRole::Admin.as_str()))
            .select(UserSummary::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(admin)
    }

    fn find_facility(&self, id: i32) -> AppResult<Option<FacilitySummary>> {
        let mut conn = self.conn()?;
        let facility = installations::table
            .find(id)
            .select(FacilitySummary::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(facility)
    }

    fn users_by_ids(&self, ids: &[i32]) -> AppResult<Vec<UserSummary>> {
        let mut conn = self.conn()?;
        let found = users::table
            .filter(users::id.eq_any(ids.to_vec()))
            .select(UserSummary::as_select())
            .load(&mut conn)?;
        Ok(found)
    }

    fn facilities_by_ids(&self, ids: &[i32]) -> AppResult<Vec<FacilitySummary>> {
        let mut conn = self.conn()?;
        let found = installations::table
            .filter(installations::id.eq_any(ids.to_vec()))
            .select(FacilitySummary::as_select())
            .load(&mut conn)?;
        Ok(found)
    }

    fn insert(&self, report: NewReport) -> AppResult<Report> {
        let mut conn = self.conn()?;
        let row: ReportRow = diesel::insert_into(reports::table)
            .values(&report)
            .returning(ReportRow::as_returning())
            .get_result(&mut conn)?;
        Report::try_from(row)
    }

    fn get(&self, id: i32) -> AppResult<Option<Report>> {
        let mut conn = self.conn()?;
        reports::table
            .find(id)
            .select(ReportRow::as_select())
            .first::<ReportRow>(&mut conn)
            .optional()?
            .map(Report::try_from)
            .transpose()
    }

    fn list(&self, filter: &ReportFilter, page: &OffsetParams) -> AppResult<(Vec<Report>, i64)> {
        let mut conn = self.conn()?;

        let total: i64 = Self::filtered(filter).count().get_result(&mut conn)?;

        let rows = Self::filtered(filter)
            .select(ReportRow::as_select())
            .order((reports::created_at.desc(), reports::id.desc()))
            .offset(page.offset())
            .limit(page.limit())
            .load(&mut conn)?;

        Ok((into_reports(rows)?, total))
    }

    fn update_state(&self, id: i32, change: &StateChange) -> AppResult<Option<Report>> {
        let mut conn = self.conn()?;
        diesel::update(reports::table.find(id))
            .set((
                reports::state.eq(change.state.label()),
                reports::admin_notes.eq(change.admin_notes.as_deref()),
                reports::processed_by.eq(Some(change.processed_by)),
                reports::updated_at.eq(Utc::now()),
            ))
            .returning(ReportRow::as_returning())
            .get_result::<ReportRow>(&mut conn)
            .optional()?
            .map(Report::try_from)
            .transpose()
    }

    fn delete(&self, id: i32) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(reports::table.find(id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn count_by_state(&self) -> AppResult<HashMap<ReportState, i64>> {
        let mut conn = self.conn()?;
        let rows: Vec<(String, i64)> = reports::table
            .group_by(reports::state)
            .select((reports::state, count_star()))
            .load(&mut conn)?;

        rows.into_iter()
            .map(|(label, n)| Ok::<_, AppError>((label.parse::<ReportState>()?, n)))
            .collect()
    }

    fn count_by_type(&self) -> AppResult<HashMap<ReportType, i64>> {
        let mut conn = self.conn()?;
        let rows: Vec<(String, i64)> = reports::table
            .group_by(reports::report_type)
            .select((reports::report_type, count_star()))
            .load(&mut conn)?;

        rows.into_iter()
            .map(|(label, n)| Ok::<_, AppError>((label.parse::<ReportType>()?, n)))
            .collect()
    }

    fn count_created(&self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let mut query = reports::table.into_boxed();
        if let Some(since) = since {
            query = query.filter(reports::created_at.ge(since));
        }
        if let Some(until) = until {
            query = query.filter(reports::created_at.lt(until));
        }
        let total = query.count().get_result(&mut conn)?;
        Ok(total)
    }

    fn top_reporters(&self, limit: i64) -> AppResult<Vec<(i32, i64)>> {
        let mut conn = self.conn()?;
        let rows = reports::table
            .group_by(reports::user_id)
            .select((reports::user_id, count_star()))
            .order((count_star().desc(), reports::user_id.asc()))
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }

    fn top_facilities(&self, limit: i64) -> AppResult<Vec<(i32, i64)>> {
        let mut conn = self.conn()?;
        let rows = reports::table
            .group_by(reports::installation_id)
            .select((reports::installation_id, count_star()))
            .order((count_star().desc(), reports::installation_id.asc()))
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }

    fn users_by_activity(&self, page: &OffsetParams) -> AppResult<(Vec<(UserRecord, i64)>, i64)> {
        let mut conn = self.conn()?;

        let total: i64 = users::table.count().get_result(&mut conn)?;

        let rows: Vec<(i32, String, bool, DateTime<Utc>, i64)> = users::table
            .left_join(reports::table.on(reports::user_id.eq(users::id)))
            .group_by(users::id)
            .select((
                users::id,
                users::email,
                users::is_verified,
                users::created_at,
                count(reports::id.nullable()),
            ))
            .order((count(reports::id.nullable()).desc(), users::id.asc()))
            .offset(page.offset())
            .limit(page.limit())
            .load(&mut conn)?;

        let users = rows
            .into_iter()
            .map(|(id, email, is_verified, created_at, n)| {
                (UserRecord { id, email, is_verified, created_at }, n)
            })
            .collect();
        Ok((users, total))
    }

    fn recent_for_user(&self, user_id: i32, limit: i64) -> AppResult<Vec<Report>> {
        let mut conn = self.conn()?;
        let rows = reports::table
            .filter(reports::user_id.eq(user_id))
            .select(ReportRow::as_select())
            .order((reports::created_at.desc(), reports::id.desc()))
            .limit(limit)
            .load(&mut conn)?;
        into_reports(rows)
    }
}

// --- In-memory ---

#[derive(Default)]
struct MemoryTables {
    users: Vec<UserRecord>,
    roles: HashMap<i32, UserRole>,
    facilities: Vec<FacilitySummary>,
    reports: Vec<Report>,
    next_id: i32,
}

/// Test double mirroring the table semantics, including the cascade from a
/// removed user to their reports.
#[derive(Default)]
pub struct MemoryReportStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: i32, email: &str) {
        self.insert_user(id, email, UserRole::User);
    }

    pub fn add_admin(&self, id: i32, email: &str) {
        self.insert_user(id, email, UserRole::Admin);
    }

    pub fn set_role(&self, id: i32, role: UserRole) {
        self.tables().roles.insert(id, role);
    }

    fn insert_user(&self, id: i32, email: &str, role: UserRole) {
        let mut tables = self.tables();
        tables.users.push(UserRecord {
            id,
            email: email.to_string(),
            is_verified: true,
            created_at: Utc::now(),
        });
        tables.roles.insert(id, role);
    }

    pub fn remove_user(&self, id: i32) {
        let mut tables = self.tables();
        tables.users.retain(|u| u.id != id);
        tables.roles.remove(&id);
        tables.reports.retain(|r| r.user_id != id);
        for report in tables.reports.iter_mut() {
            if report.processed_by == Some(id) {
                report.processed_by = None;
            }
        }
    }

    pub fn add_facility(&self, id: i32, name: &str) {
        self.tables().facilities.push(FacilitySummary {
            id,
            external_code: Some(format!("I{id:06}")),
            name: Some(name.to_string()),
            address: None,
            type_name: None,
        });
    }

    fn tables(&self) -> MutexGuard<'_, MemoryTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn window<T>(items: Vec<T>, page: &OffsetParams) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

fn ranked(counts: HashMap<i32, i64>, limit: i64) -> Vec<(i32, i64)> {
    let mut ranked: Vec<(i32, i64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit.max(0) as usize);
    ranked
}

impl ReportStore for MemoryReportStore {
    fn find_user(&self, id: i32) -> AppResult<Option<UserSummary>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| UserSummary { id: u.id, email: u.email.clone() }))
    }

    fn find_admin(&self, id: i32) -> AppResult<Option<UserSummary>> {
        let tables = self.tables();
        if tables.roles.get(&id) != Some(&UserRole::Admin) {
            return Ok(None);
        }
        Ok(tables
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| UserSummary { id: u.id, email: u.email.clone() }))
    }

    fn find_facility(&self, id: i32) -> AppResult<Option<FacilitySummary>> {
        Ok(self.tables().facilities.iter().find(|f| f.id == id).cloned())
    }

    fn users_by_ids(&self, ids: &[i32]) -> AppResult<Vec<UserSummary>> {
        Ok(self
            .tables()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(|u| UserSummary { id: u.id, email: u.email.clone() })
            .collect())
    }

    fn facilities_by_ids(&self, ids: &[i32]) -> AppResult<Vec<FacilitySummary>> {
        Ok(self
            .tables()
            .facilities
            .iter()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect())
    }

    fn insert(&self, new: NewReport) -> AppResult<Report> {
        let mut tables = self.tables();
        tables.next_id += 1;
        let now = Utc::now();
        let report = Report {
            id: tables.next_id,
            message: new.message,
            images_url: new.images_url,
            report_type: new.report_type.parse()?,
            state: new.state.parse()?,
            user_id: new.user_id,
            installation_id: new.installation_id,
            admin_notes: None,
            processed_by: None,
            created_at: now,
            updated_at: now,
        };
        tables.reports.push(report.clone());
        Ok(report)
    }

    fn get(&self, id: i32) -> AppResult<Option<Report>> {
        Ok(self.tables().reports.iter().find(|r| r.id == id).cloned())
    }

    fn list(&self, filter: &ReportFilter, page: &OffsetParams) -> AppResult<(Vec<Report>, i64)> {
        let mut matching: Vec<Report> = self
            .tables()
            .reports
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut matching);
        let total = matching.len() as i64;
        Ok((window(matching, page), total))
    }

    fn update_state(&self, id: i32, change: &StateChange) -> AppResult<Option<Report>> {
        let mut tables = self.tables();
        Ok(tables.reports.iter_mut().find(|r| r.id == id).map(|report| {
            report.state = change.state;
            report.admin_notes = change.admin_notes.clone();
            report.processed_by = Some(change.processed_by);
            report.updated_at = Utc::now();
            report.clone()
        }))
    }

    fn delete(&self, id: i32) -> AppResult<bool> {
        let mut tables = self.tables();
        let before = tables.reports.len();
        tables.reports.retain(|r| r.id != id);
        Ok(tables.reports.len() < before)
    }

    fn count_by_state(&self) -> AppResult<HashMap<ReportState, i64>> {
        let mut counts = HashMap::new();
        for report in &self.tables().reports {
            *counts.entry(report.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn count_by_type(&self) -> AppResult<HashMap<ReportType, i64>> {
        let mut counts = HashMap::new();
        for report in &self.tables().reports {
            *counts.entry(report.report_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn count_created(&self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> AppResult<i64> {
        Ok(self
            .tables()
            .reports
            .iter()
            .filter(|r| since.map_or(true, |s| r.created_at >= s))
            .filter(|r| until.map_or(true, |u| r.created_at < u))
            .count() as i64)
    }

    fn top_reporters(&self, limit: i64) -> AppResult<Vec<(i32, i64)>> {
        let mut counts = HashMap::new();
        for report in &self.tables().reports {
            *counts.entry(report.user_id).or_insert(0) += 1;
        }
        Ok(ranked(counts, limit))
    }

    fn top_facilities(&self, limit: i64) -> AppResult<Vec<(i32, i64)>> {
        let mut counts = HashMap::new();
        for report in &self.tables().reports {
            *counts.entry(report.installation_id).or_insert(0) += 1;
        }
        Ok(ranked(counts, limit))
    }

    fn users_by_activity(&self, page: &OffsetParams) -> AppResult<(Vec<(UserRecord, i64)>, i64)> {
        let tables = self.tables();
        let mut users: Vec<(UserRecord, i64)> = tables
            .users
            .iter()
            .map(|u| {
                let n = tables.reports.iter().filter(|r| r.user_id == u.id).count() as i64;
                (u.clone(), n)
            })
            .collect();
        users.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
        let total = users.len() as i64;
        Ok((window(users, page), total))
    }

    fn recent_for_user(&self, user_id: i32, limit: i64) -> AppResult<Vec<Report>> {
        let mut mine: Vec<Report> = self
            .tables()
            .reports
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut mine);
        mine.truncate(limit.max(0) as usize);
        Ok(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryReportStore {
        let store = MemoryReportStore::new();
        store.add_user(1, "ana@sportmap.fr");
        store.add_user(2, "bo@sportmap.fr");
        store.add_facility(10, "Stade Vélodrome");
        store
    }

    fn file(store: &MemoryReportStore, user_id: i32, kind: ReportType) -> Report {
        store
            .insert(NewReport::new(user_id, 10, "Panier cassé".into(), None, kind))
            .unwrap()
    }

    #[test]
    fn list_filters_and_pages_newest_first() {
        let store = seeded();
        file(&store, 1, ReportType::Safety);
        let second = file(&store, 1, ReportType::Other);
        file(&store, 2, ReportType::Safety);

        let filter = ReportFilter { user_id: Some(1), ..Default::default() };
        let (items, total) = store.list(&filter, &OffsetParams::new(1, 0)).unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, second.id);

        let filter = ReportFilter { report_type: Some(ReportType::Safety), ..Default::default() };
        assert_eq!(store.list(&filter, &OffsetParams::default()).unwrap().1, 2);
    }

    #[test]
    fn removing_a_user_cascades_to_their_reports_and_clears_processor() {
        let store = seeded();
        let report = file(&store, 1, ReportType::Other);
        file(&store, 2, ReportType::Other);
        let change = StateChange { state: ReportState::Closed, admin_notes: None, processed_by: 2 };
        store.update_state(report.id, &change).unwrap();

        store.remove_user(2);

        let (items, total) = store.list(&ReportFilter::default(), &OffsetParams::default()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].processed_by, None);
        assert_eq!(items[0].state, ReportState::Closed);
    }

    #[test]
    fn admin_lookup_follows_the_stored_role() {
        let store = seeded();
        store.add_admin(3, "cy@sportmap.fr");

        assert_eq!(store.find_admin(1).unwrap(), None);
        assert_eq!(store.find_admin(3).unwrap().map(|u| u.email), Some("cy@sportmap.fr".into()));

        store.set_role(3, UserRole::User);
        assert_eq!(store.find_admin(3).unwrap(), None);

        store.set_role(3, UserRole::Admin);
        store.remove_user(3);
        assert_eq!(store.find_admin(3).unwrap(), None);
    }

    #[test]
    fn activity_ranking_counts_reports_per_user() {
        let store = seeded();
        file(&store, 2, ReportType::Other);
        file(&store, 2, ReportType::Other);
        file(&store, 1, ReportType::Other);

        assert_eq!(store.top_reporters(10).unwrap(), vec![(2, 2), (1, 1)]);
        assert_eq!(store.top_facilities(10).unwrap(), vec![(10, 3)]);

        let (users, total) = store.users_by_activity(&OffsetParams::default()).unwrap();
        assert_eq!(total, 2);
        assert_eq!(users[0].0.id, 2);
        assert_eq!(users[0].1, 2);
    }
}
