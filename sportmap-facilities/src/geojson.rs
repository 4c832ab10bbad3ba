use serde::Serialize;

use crate::models::Facility;
use crate::sports::SportsField;

#[derive(Debug, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeatureCollection {
    /// Facilities without a point are left out; they never fail the export.
    pub fn from_facilities(facilities: &[Facility]) -> Self {
        Self {
            kind: "FeatureCollection",
            features: facilities.iter().filter_map(Feature::from_facility).collect(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: "FeatureCollection",
            features: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: Point,
    pub properties: FeatureProperties,
}

#[derive(Debug, Serialize)]
pub struct Point {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Serialize)]
pub struct FeatureProperties {
    pub id: i32,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub family: Option<String>,
    pub sports: Option<SportsField>,
    pub free_access: bool,
    pub url: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub owner: Option<String>,
    pub operator_type: Option<String>,
    pub accessible_to_disabled: bool,
}

impl Feature {
    pub fn from_facility(facility: &Facility) -> Option<Self> {
        let point = facility.coordinates?;

        Some(Self {
            kind: "Feature",
            geometry: Point {
                kind: "Point",
                coordinates: [point.longitude, point.latitude],
            },
            properties: FeatureProperties {
                id: facility.id,
                name: facility.name.clone(),
                type_name: facility.type_name.clone(),
                family: facility.type_family.clone(),
                sports: facility.sports.as_deref().map(SportsField::parse),
                free_access: facility.free_access,
                url: facility.url.clone(),
                address: facility.address.clone(),
                postal_code: facility.postal_code.clone(),
                owner: facility.owner_name.clone(),
                operator_type: facility.operator_type.clone(),
                accessible_to_disabled: facility.accessible_to_disabled,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewFacility;

    #[test]
    fn pointless_facilities_are_skipped() {
        let with_point = NewFacility {
            longitude: 5.4,
            latitude: 43.3,
            sports: "['Tennis','Padel']".into(),
            ..Default::default()
        }
        .into_facility(1);
        let mut without_point = with_point.clone();
        without_point.id = 2;
        without_point.coordinates = None;

        let collection = FeatureCollection::from_facilities(&[with_point, without_point]);
        let value = serde_json::to_value(&collection).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"].as_array().unwrap().len(), 1);
        let feature = &value["features"][0];
        assert_eq!(feature["geometry"]["coordinates"], serde_json::json!([5.4, 43.3]));
        assert_eq!(feature["properties"]["sports"], serde_json::json!(["Tennis", "Padel"]));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failed_export_has_no_features() {
        let value = serde_json::to_value(FeatureCollection::failed("boom")).unwrap();
        assert_eq!(value["features"], serde_json::json!([]));
        assert_eq!(value["error"], "boom");
    }
}
