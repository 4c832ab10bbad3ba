use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::installations;

// --- Coordinates ---

/// WGS84 point, `{"lon": .., "lat": ..}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "lat")]
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Both halves must be present for a usable point.
    pub fn from_parts(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(longitude), Some(latitude)) => Some(Self { longitude, latitude }),
            _ => None,
        }
    }
}

// --- Facility ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facility {
    pub id: i32,
    pub external_code: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub type_family: Option<String>,
    pub sports: Option<String>,
    pub free_access: bool,
    pub url: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub owner_name: Option<String>,
    pub operator_type: Option<String>,
    pub accessible_to_disabled: bool,
}

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = installations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FacilityRow {
    pub id: i32,
    pub external_code: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub type_family: Option<String>,
    pub sports: Option<String>,
    pub free_access: bool,
    pub url: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub owner_name: Option<String>,
    pub operator_type: Option<String>,
    pub accessible_to_disabled: bool,
}

impl From<FacilityRow> for Facility {
    fn from(row: FacilityRow) -> Self {
        Self {
            id: row.id,
            external_code: row.external_code,
            coordinates: Coordinates::from_parts(row.longitude, row.latitude),
            name: row.name,
            type_name: row.type_name,
            type_family: row.type_family,
            sports: row.sports,
            free_access: row.free_access,
            url: row.url,
            address: row.address,
            postal_code: row.postal_code,
            owner_name: row.owner_name,
            operator_type: row.operator_type,
            accessible_to_disabled: row.accessible_to_disabled,
        }
    }
}

/// A validated row ready for bulk insertion. Text fields are never null.
#[derive(Debug, Clone, Default, PartialEq, Insertable)]
#[diesel(table_name = installations)]
pub struct NewFacility {
    pub external_code: String,
    pub longitude: f64,
    pub latitude: f64,
    pub name: String,
    pub type_name: String,
    pub type_family: String,
    pub sports: String,
    pub free_access: bool,
    pub url: String,
    pub address: String,
    pub postal_code: String,
    pub owner_name: String,
    pub operator_type: String,
    pub accessible_to_disabled: bool,
}

impl NewFacility {
    pub fn into_facility(self, id: i32) -> Facility {
        Facility {
            id,
            external_code: Some(self.external_code),
            coordinates: Some(Coordinates::new(self.longitude, self.latitude)),
            name: Some(self.name),
            type_name: Some(self.type_name),
            type_family: Some(self.type_family),
            sports: Some(self.sports),
            free_access: self.free_access,
            url: Some(self.url),
            address: Some(self.address),
            postal_code: Some(self.postal_code),
            owner_name: Some(self.owner_name),
            operator_type: Some(self.operator_type),
            accessible_to_disabled: self.accessible_to_disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_serialize_as_lon_lat() {
        let value = serde_json::to_value(Coordinates::new(5.4, 43.3)).unwrap();
        assert_eq!(value, serde_json::json!({ "lon": 5.4, "lat": 43.3 }));
    }

    #[test]
    fn half_a_point_is_no_point() {
        assert_eq!(Coordinates::from_parts(Some(5.4), None), None);
        assert_eq!(Coordinates::from_parts(None, Some(43.3)), None);
        assert!(Coordinates::from_parts(Some(5.4), Some(43.3)).is_some());
    }
}
