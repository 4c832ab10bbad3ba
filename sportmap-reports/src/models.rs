use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use sportmap_shared::errors::{AppError, ErrorCode};

use crate::schema::{installations, reports, users};

// --- ReportState ---

/// Triage state. Any state may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportState {
    #[serde(rename = "Nouveau")]
    New,
    #[serde(rename = "Vérification")]
    UnderReview,
    #[serde(rename = "En maintenance")]
    InMaintenance,
    #[serde(rename = "Maintenance effectuée")]
    MaintenanceDone,
    #[serde(rename = "Rejeté")]
    Rejected,
    #[serde(rename = "Fermé")]
    Closed,
}

impl ReportState {
    pub const ALL: [ReportState; 6] = [
        ReportState::New,
        ReportState::UnderReview,
        ReportState::InMaintenance,
        ReportState::MaintenanceDone,
        ReportState::Rejected,
        ReportState::Closed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReportState::New => "Nouveau",
            ReportState::UnderReview => "Vérification",
            ReportState::InMaintenance => "En maintenance",
            ReportState::MaintenanceDone => "Maintenance effectuée",
            ReportState::Rejected => "Rejeté",
            ReportState::Closed => "Fermé",
        }
    }

    pub fn is_new(&self) -> bool {
        *self == ReportState::New
    }

    /// Derived classification only; a terminal report can still be reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportState::MaintenanceDone | ReportState::Closed | ReportState::Rejected
        )
    }
}

impl FromStr for ReportState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportState::ALL
            .into_iter()
            .find(|state| state.label() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = ReportState::ALL.iter().map(|s| s.label()).collect();
                AppError::new(
                    ErrorCode::InvalidReportState,
                    format!("invalid state '{s}'. Valid states: {}", valid.join(", ")),
                )
            })
    }
}

// --- ReportType ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "Dégradation")]
    Degradation,
    #[serde(rename = "Équipement cassé")]
    BrokenEquipment,
    #[serde(rename = "Problème d'accès")]
    AccessProblem,
    #[serde(rename = "Sécurité")]
    Safety,
    #[serde(rename = "Propreté")]
    Cleanliness,
    #[default]
    #[serde(rename = "Autre")]
    Other,
}

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        ReportType::Degradation,
        ReportType::BrokenEquipment,
        ReportType::AccessProblem,
        ReportType::Safety,
        ReportType::Cleanliness,
        ReportType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReportType::Degradation => "Dégradation",
            ReportType::BrokenEquipment => "Équipement cassé",
            ReportType::AccessProblem => "Problème d'accès",
            ReportType::Safety => "Sécurité",
            ReportType::Cleanliness => "Propreté",
            ReportType::Other => "Autre",
        }
    }
}

impl FromStr for ReportType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = ReportType::ALL.iter().map(|t| t.label()).collect();
                AppError::new(
                    ErrorCode::InvalidReportType,
                    format!("invalid report type '{s}'. Valid types: {}", valid.join(", ")),
                )
            })
    }
}

// --- Report ---

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: i32,
    pub message: String,
    pub images_url: Option<String>,
    pub report_type: ReportType,
    pub state: ReportState,
    pub user_id: i32,
    pub installation_id: i32,
    pub admin_notes: Option<String>,
    pub processed_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReportRow {
    pub id: i32,
    pub message: String,
    pub images_url: Option<String>,
    pub report_type: String,
    pub state: String,
    pub user_id: i32,
    pub installation_id: i32,
    pub admin_notes: Option<String>,
    pub processed_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = AppError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let corrupt = |e: AppError| AppError::internal(format!("report {} is corrupt: {e}", row.id));
        Ok(Self {
            report_type: row.report_type.parse().map_err(corrupt)?,
            state: row.state.parse().map_err(corrupt)?,
            id: row.id,
            message: row.message,
            images_url: row.images_url,
            user_id: row.user_id,
            installation_id: row.installation_id,
            admin_notes: row.admin_notes,
            processed_by: row.processed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport {
    pub message: String,
    pub images_url: Option<String>,
    pub report_type: String,
    pub state: String,
    pub user_id: i32,
    pub installation_id: i32,
}

impl NewReport {
    pub fn new(
        user_id: i32,
        installation_id: i32,
        message: String,
        images_url: Option<String>,
        report_type: ReportType,
    ) -> Self {
        Self {
            message,
            images_url,
            report_type: report_type.label().to_string(),
            state: ReportState::New.label().to_string(),
            user_id,
            installation_id,
        }
    }
}

/// What an admin changes when triaging a report.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub state: ReportState,
    pub admin_notes: Option<String>,
    pub processed_by: i32,
}

// --- Users and facilities as seen from reports ---

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct UserSummary {
    pub id: i32,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct UserRecord {
    pub id: i32,
    pub email: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable)]
#[diesel(table_name = installations)]
pub struct FacilitySummary {
    pub id: i32,
    pub external_code: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub type_name: Option<String>,
}
