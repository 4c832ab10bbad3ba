use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use diesel::prelude::*;

use sportmap_shared::clients::db::{DbConn, DbPool};
use sportmap_shared::errors::{AppError, AppResult};

use crate::filter::FacilityFilter;
use crate::models::{Facility, FacilityRow, NewFacility};
use crate::schema::installations;

/// Authoritative facility table. Calls are blocking.
pub trait FacilityStore: Send + Sync {
    fn count(&self) -> AppResult<i64>;

    /// Matching facilities in id order.
    fn list(&self, filter: &FacilityFilter) -> AppResult<Vec<Facility>>;

    fn list_limited(&self, limit: i64) -> AppResult<Vec<Facility>>;

    /// Raw `sports` column of every facility.
    fn sports_fields(&self) -> AppResult<Vec<Option<String>>>;

    /// One bulk insert; returns the number of rows written.
    fn insert_batch(&self, batch: &[NewFacility]) -> AppResult<usize>;

    /// Removes every facility. Reports referencing them go with them.
    fn clear(&self) -> AppResult<usize>;

    fn ping(&self) -> AppResult<()>;
}

// --- PostgreSQL ---

pub struct PgFacilityStore {
    pool: DbPool,
}

impl PgFacilityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<DbConn> {
        self.pool
            .get()
            .map_err(|e| AppError::internal(format!("db pool error: {e}")))
    }
}

impl FacilityStore for PgFacilityStore {
    fn count(&self) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let total = installations::table
            .count()
            .get_result(&mut conn)?;
        Ok(total)
    }

    fn list(&self, filter: &FacilityFilter) -> AppResult<Vec<Facility>> {
        let mut conn = self.conn()?;
        let mut query = installations::table
            .select(FacilityRow::as_select())
            .order(installations::id.asc())
            .into_boxed();

        if let Some(b) = &filter.bounds {
            query = query
                .filter(installations::longitude.between(b.sw_lng, b.ne_lng))
                .filter(installations::latitude.between(b.sw_lat, b.ne_lat));
        }
        if let Some(types) = &filter.types {
            query = query.filter(installations::type_name.eq_any(types.clone()));
        }

        let rows = query.load::<FacilityRow>(&mut conn)?;
        Ok(rows.into_iter().map(Facility::from).collect())
    }

    fn list_limited(&self, limit: i64) -> AppResult<Vec<Facility>> {
        let mut conn = self.conn()?;
        let rows = installations::table
            .select(FacilityRow::as_select())
            .limit(limit)
            .load::<FacilityRow>(&mut conn)?;
        Ok(rows.into_iter().map(Facility::from).collect())
    }

    fn sports_fields(&self) -> AppResult<Vec<Option<String>>> {
        let mut conn = self.conn()?;
        let fields = installations::table
            .select(installations::sports)
            .load::<Option<String>>(&mut conn)?;
        Ok(fields)
    }

    fn insert_batch(&self, batch: &[NewFacility]) -> AppResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let inserted = diesel::insert_into(installations::table)
            .values(batch)
            .execute(&mut conn)?;
        Ok(inserted)
    }

    fn clear(&self) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(installations::table).execute(&mut conn)?;
        Ok(deleted)
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

// --- In-memory ---

#[derive(Default)]
struct MemoryRows {
    facilities: Vec<Facility>,
    next_id: i32,
}

/// Process-local store with the same id semantics as the table: ids only
/// ever grow, even across `clear`.
#[derive(Default)]
pub struct MemoryFacilityStore {
    rows: Mutex<MemoryRows>,
    unavailable: AtomicBool,
}

impl MemoryFacilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn rows(&self) -> AppResult<MutexGuard<'_, MemoryRows>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::internal("facility store unavailable"));
        }
        Ok(self.rows.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl FacilityStore for MemoryFacilityStore {
    fn count(&self) -> AppResult<i64> {
        Ok(self.rows()?.facilities.len() as i64)
    }

    fn list(&self, filter: &FacilityFilter) -> AppResult<Vec<Facility>> {
        Ok(self
            .rows()?
            .facilities
            .iter()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    fn list_limited(&self, limit: i64) -> AppResult<Vec<Facility>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.rows()?.facilities.iter().take(limit).cloned().collect())
    }

    fn sports_fields(&self) -> AppResult<Vec<Option<String>>> {
        Ok(self
            .rows()?
            .facilities
            .iter()
            .map(|f| f.sports.clone())
            .collect())
    }

    fn insert_batch(&self, batch: &[NewFacility]) -> AppResult<usize> {
        let mut rows = self.rows()?;
        for new in batch {
            rows.next_id += 1;
            let id = rows.next_id;
            rows.facilities.push(new.clone().into_facility(id));
        }
        Ok(batch.len())
    }

    fn clear(&self) -> AppResult<usize> {
        let mut rows = self.rows()?;
        let deleted = rows.facilities.len();
        rows.facilities.clear();
        Ok(deleted)
    }

    fn ping(&self) -> AppResult<()> {
        self.rows().map(|_| ())
    }
}
