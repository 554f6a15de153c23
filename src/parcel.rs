//! Parcel records and their GeoJSON loading path.
//!
//! Parcels are read-only session data: loaded once, re-classified on every
//! evaluation. A parcel with missing or malformed geometry is skipped and
//! counted, never fatal.

use geojson::{Feature, GeoJson};
use serde_json::Map;
use std::path::Path;

use crate::error::MilehighError;
use crate::log::warn;

/// One candidate parcel as loaded from the assessor dump.
#[derive(Debug, Clone)]
pub struct Parcel {
    pub parcel_id: String,
    pub address: Option<String>,
    pub zone_district: String,
    pub property_class: Option<String>,
    pub owner_type: Option<String>,
    pub land_area_acres: f64,
    pub land_value: Option<f64>,
    pub improvement_value: Option<f64>,
    pub current_units: Option<u64>,
    /// Earliest of the residential/commercial original construction years.
    pub year_built: Option<i64>,
    pub opportunity_type: Option<String>,
    /// Original WGS84 geometry, echoed into result GeoJSON untouched.
    pub geometry: geojson::Geometry,
    /// The same geometry as geo-types, for measurement.
    pub geo: geo::Geometry<f64>,
}

/// The loaded parcel set plus the count of skipped/invalid records.
#[derive(Debug, Default)]
pub struct ParcelSet {
    pub parcels: Vec<Parcel>,
    pub skipped_invalid: usize,
}

impl ParcelSet {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, MilehighError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&raw)
    }

    pub fn from_geojson_str(raw: &str) -> Result<Self, MilehighError> {
        let geojson = raw.parse::<GeoJson>()?;
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(MilehighError::MilehighError(
                "parcel file must be a GeoJSON FeatureCollection".to_string(),
            ));
        };

        let mut set = ParcelSet::default();
        for (i, feature) in collection.features.into_iter().enumerate() {
            match parcel_from_feature(feature, i) {
                Some(parcel) => set.parcels.push(parcel),
                None => {
                    set.skipped_invalid += 1;
                }
            }
        }
        Ok(set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }
}

fn parcel_from_feature(feature: Feature, index: usize) -> Option<Parcel> {
    let properties = feature.properties.unwrap_or_default();
    let parcel_id = prop_string(&properties, "parcel_id")
        .or_else(|| prop_string(&properties, "SCHEDNUM"))
        .unwrap_or_else(|| format!("parcel-{index}"));

    let Some(geometry) = feature.geometry else {
        warn!("parcel {parcel_id}: missing geometry, skipping");
        return None;
    };
    let geo = match geo::Geometry::<f64>::try_from(&geometry) {
        Ok(geo) => geo,
        Err(e) => {
            warn!("parcel {parcel_id}: malformed geometry ({e}), skipping");
            return None;
        }
    };

    let year_built = match (
        prop_i64(&properties, "res_orig_year_built"),
        prop_i64(&properties, "com_orig_year_built"),
    ) {
        (Some(res), Some(com)) => Some(res.min(com)),
        (res, com) => res.or(com),
    };

    Some(Parcel {
        parcel_id,
        address: prop_string(&properties, "address")
            .or_else(|| prop_string(&properties, "SITUS_ADDRESS_LINE1")),
        zone_district: prop_string(&properties, "zone_district")
            .or_else(|| prop_string(&properties, "ZONE_DISTRICT"))
            .unwrap_or_default(),
        property_class: prop_string(&properties, "property_class"),
        owner_type: prop_string(&properties, "owner_type"),
        land_area_acres: prop_f64(&properties, "land_area_acres").unwrap_or(0.0),
        land_value: prop_f64(&properties, "land_value"),
        improvement_value: prop_f64(&properties, "improvement_value"),
        current_units: prop_f64(&properties, "current_units").map(|v| v.max(0.0) as u64),
        year_built,
        opportunity_type: prop_string(&properties, "opportunity_type"),
        geometry,
        geo,
    })
}

pub(crate) fn prop_string(properties: &Map<String, serde_json::Value>, key: &str) -> Option<String> {
    match properties.get(key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric properties arrive as JSON numbers or, in some exports, as
/// stringified numbers. Accept both.
pub(crate) fn prop_f64(properties: &Map<String, serde_json::Value>, key: &str) -> Option<f64> {
    match properties.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn prop_i64(properties: &Map<String, serde_json::Value>, key: &str) -> Option<i64> {
    prop_f64(properties, key).map(|v| v as i64)
}
