use std::str::FromStr;

use sportmap_shared::errors::{AppError, ErrorCode};

use crate::models::{Coordinates, Facility};

pub const FULL_LISTING_KEY: &str = "facilities:all";

/// Rectangle given by its south-west and north-east corners, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub sw_lng: f64,
    pub sw_lat: f64,
    pub ne_lng: f64,
    pub ne_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &Coordinates) -> bool {
        (self.sw_lng..=self.ne_lng).contains(&point.longitude)
            && (self.sw_lat..=self.ne_lat).contains(&point.latitude)
    }
}

impl FromStr for BoundingBox {
    type Err = AppError;

    /// Parses `sw_lng,sw_lat,ne_lng,ne_lat`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            AppError::new(
                ErrorCode::InvalidBounds,
                format!("invalid bounds '{s}': expected sw_lng,sw_lat,ne_lng,ne_lat"),
            )
        };

        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match values.as_slice() {
            &[sw_lng, sw_lat, ne_lng, ne_lat] if values.iter().all(|v| v.is_finite()) => Ok(Self {
                sw_lng,
                sw_lat,
                ne_lng,
                ne_lat,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Listing filter; bounds and types combine with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacilityFilter {
    pub bounds: Option<BoundingBox>,
    pub types: Option<Vec<String>>,
}

impl FacilityFilter {
    pub fn from_params(bounds: Option<&str>, types: Option<&str>) -> Result<Self, AppError> {
        let bounds = bounds
            .filter(|b| !b.trim().is_empty())
            .map(str::parse::<BoundingBox>)
            .transpose()?;

        let types = types
            .map(|raw| {
                let mut list: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                list.sort();
                list.dedup();
                list
            })
            .filter(|list| !list.is_empty());

        Ok(Self { bounds, types })
    }

    pub fn is_unfiltered(&self) -> bool {
        self.bounds.is_none() && self.types.is_none()
    }

    pub fn matches(&self, facility: &Facility) -> bool {
        if let Some(bounds) = &self.bounds {
            match &facility.coordinates {
                Some(point) if bounds.contains(point) => {}
                _ => return false,
            }
        }
        if let Some(types) = &self.types {
            match &facility.type_name {
                Some(type_name) if types.contains(type_name) => {}
                _ => return false,
            }
        }
        true
    }

    /// Cache slot for this listing. The unfiltered listing always lands in
    /// [`FULL_LISTING_KEY`]; filtered listings get their own slot.
    pub fn cache_key(&self) -> String {
        if self.is_unfiltered() {
            return FULL_LISTING_KEY.to_string();
        }

        let mut key = String::from(FULL_LISTING_KEY);
        if let Some(b) = &self.bounds {
            key.push_str(&format!(":bounds={},{},{},{}", b.sw_lng, b.sw_lat, b.ne_lng, b.ne_lat));
        }
        if let Some(types) = &self.types {
            key.push_str(&format!(":types={}", types.join(",")));
        }
        key
    }
}
