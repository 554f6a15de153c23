//! Reference feature data: light-rail stations and lines, parks, bus stops,
//! and optional BRT lines.
//!
//! Loaded once per session and reused across re-evaluations. Absence of the
//! BRT file is tolerated (the policy simply matches nothing), matching how
//! the upstream data is published.

use geojson::GeoJson;
use std::path::Path;

use crate::error::MilehighError;
use crate::geometry::LocalProjection;
use crate::log::{info, warn};
use crate::parcel::{prop_f64, prop_string};

/// The feature classes policies measure against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureClass {
    LightRail,
    RegionalPark,
    CommunityPark,
    BusStop,
    BrtLine,
}

/// Acreage-based park classification: 75+ acres regional, 10-75 community.
/// Smaller pocket parks do not anchor a POD ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkType {
    Regional,
    Community,
    Pocket,
}

impl ParkType {
    #[must_use]
    pub fn from_acres(acres: f64) -> Self {
        if acres >= 75.0 {
            ParkType::Regional
        } else if acres >= 10.0 {
            ParkType::Community
        } else {
            ParkType::Pocket
        }
    }

    /// The lowercase wire name used in feature properties.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ParkType::Regional => "regional",
            ParkType::Community => "community",
            ParkType::Pocket => "pocket",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Station {
    pub name: String,
    pub rail_line: Option<String>,
    pub geo: geo::Geometry<f64>,
}

#[derive(Debug, Clone)]
pub struct RailLine {
    pub route: String,
    pub geo: geo::Geometry<f64>,
}

#[derive(Debug, Clone)]
pub struct Park {
    pub name: String,
    pub park_type: ParkType,
    pub land_area_acres: f64,
    pub geo: geo::Geometry<f64>,
}

/// Minimum peak trips per hour for a stop to count as frequent service.
pub const FREQUENT_BUS_TRIPS_PER_HOUR: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct BusStop {
    pub stop_id: String,
    pub name: Option<String>,
    pub am_trips_per_hour: f64,
    pub pm_trips_per_hour: f64,
    pub geo: geo::Geometry<f64>,
}

impl BusStop {
    /// Highest of the AM/PM peak frequencies.
    #[must_use]
    pub fn peak_frequency(&self) -> f64 {
        self.am_trips_per_hour.max(self.pm_trips_per_hour)
    }

    #[must_use]
    pub fn is_frequent(&self) -> bool {
        self.peak_frequency() >= FREQUENT_BUS_TRIPS_PER_HOUR
    }
}

#[derive(Debug, Clone)]
pub struct BrtLine {
    pub name: String,
    pub geo: geo::Geometry<f64>,
}

/// All reference features for one session.
#[derive(Debug, Default)]
pub struct FeatureCatalog {
    pub stations: Vec<Station>,
    pub rail_lines: Vec<RailLine>,
    pub parks: Vec<Park>,
    pub bus_stops: Vec<BusStop>,
    pub brt_lines: Vec<BrtLine>,
}

impl FeatureCatalog {
    /// Loads the catalog from a directory of GeoJSON files. `stations.geojson`
    /// is required; the others degrade to empty sets with a log line.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, MilehighError> {
        let dir = dir.as_ref();
        let catalog = FeatureCatalog {
            stations: load_features(&dir.join("stations.geojson"), true, station_from)?,
            rail_lines: load_features(&dir.join("rail_lines.geojson"), false, rail_line_from)?,
            parks: load_features(&dir.join("parks.geojson"), false, park_from)?,
            bus_stops: load_features(&dir.join("bus_stops.geojson"), false, bus_stop_from)?,
            brt_lines: load_features(&dir.join("brt_lines.geojson"), false, brt_line_from)?,
        };

        info!(
            "feature catalog: {} stations, {} rail lines, {} parks, {} bus stops, {} BRT lines",
            catalog.stations.len(),
            catalog.rail_lines.len(),
            catalog.parks.len(),
            catalog.bus_stops.len(),
            catalog.brt_lines.len()
        );
        Ok(catalog)
    }

    /// Projected geometries for one feature class, ready for indexing.
    /// Regional/community parks and frequent bus stops are filtered here so
    /// the evaluator never re-derives classification rules.
    #[must_use]
    pub fn class_geometries(
        &self,
        class: FeatureClass,
        projection: &LocalProjection,
    ) -> Vec<geo::Geometry<f64>> {
        let project = |geo: &geo::Geometry<f64>| projection.project_geometry(geo);
        match class {
            FeatureClass::LightRail => self.stations.iter().map(|s| project(&s.geo)).collect(),
            FeatureClass::RegionalPark => self
                .parks
                .iter()
                .filter(|p| p.park_type == ParkType::Regional)
                .map(|p| project(&p.geo))
                .collect(),
            FeatureClass::CommunityPark => self
                .parks
                .iter()
                .filter(|p| p.park_type == ParkType::Community)
                .map(|p| project(&p.geo))
                .collect(),
            FeatureClass::BusStop => self
                .bus_stops
                .iter()
                .filter(|s| s.is_frequent())
                .map(|s| project(&s.geo))
                .collect(),
            FeatureClass::BrtLine => self.brt_lines.iter().map(|l| project(&l.geo)).collect(),
        }
    }
}

type PropertyMap = serde_json::Map<String, serde_json::Value>;

fn load_features<T>(
    path: &Path,
    required: bool,
    from: fn(&PropertyMap, geo::Geometry<f64>, usize) -> T,
) -> Result<Vec<T>, MilehighError> {
    if !path.exists() {
        if required {
            return Err(MilehighError::MilehighError(format!(
                "required feature file not found: {}",
                path.display()
            )));
        }
        info!("feature file {} not present, continuing without it", path.display());
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)?;
    let geojson = raw.parse::<GeoJson>()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(MilehighError::MilehighError(format!(
            "{} must be a GeoJSON FeatureCollection",
            path.display()
        )));
    };

    let mut features = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();
        let Some(geometry) = feature.geometry else {
            warn!("{}: feature {i} has no geometry, skipping", path.display());
            continue;
        };
        match geo::Geometry::<f64>::try_from(&geometry) {
            Ok(geo) => features.push(from(&properties, geo, i)),
            Err(e) => {
                warn!("{}: feature {i} malformed ({e}), skipping", path.display());
            }
        }
    }
    Ok(features)
}

fn station_from(properties: &PropertyMap, geo: geo::Geometry<f64>, index: usize) -> Station {
    Station {
        name: prop_string(properties, "name")
            .or_else(|| prop_string(properties, "NAME"))
            .unwrap_or_else(|| format!("station-{index}")),
        rail_line: prop_string(properties, "rail_line")
            .or_else(|| prop_string(properties, "RAIL_LINE")),
        geo,
    }
}

fn rail_line_from(properties: &PropertyMap, geo: geo::Geometry<f64>, _index: usize) -> RailLine {
    RailLine {
        route: prop_string(properties, "route")
            .or_else(|| prop_string(properties, "RAIL_LINE"))
            .unwrap_or_default(),
        geo,
    }
}

fn park_from(properties: &PropertyMap, geo: geo::Geometry<f64>, index: usize) -> Park {
    let acres = prop_f64(properties, "land_area_acres").unwrap_or(0.0);
    let park_type = match prop_string(properties, "park_type").as_deref() {
        Some("regional") => ParkType::Regional,
        Some("community") => ParkType::Community,
        Some(_) => ParkType::Pocket,
        None => ParkType::from_acres(acres),
    };
    Park {
        name: prop_string(properties, "name").unwrap_or_else(|| format!("park-{index}")),
        park_type,
        land_area_acres: acres,
        geo,
    }
}

fn bus_stop_from(properties: &PropertyMap, geo: geo::Geometry<f64>, index: usize) -> BusStop {
    BusStop {
        stop_id: prop_string(properties, "stop_id").unwrap_or_else(|| format!("stop-{index}")),
        name: prop_string(properties, "stop_name"),
        am_trips_per_hour: prop_f64(properties, "am_trips_per_hour").unwrap_or(0.0),
        pm_trips_per_hour: prop_f64(properties, "pm_trips_per_hour").unwrap_or(0.0),
        geo,
    }
}

fn brt_line_from(properties: &PropertyMap, geo: geo::Geometry<f64>, index: usize) -> BrtLine {
    BrtLine {
        name: prop_string(properties, "name").unwrap_or_else(|| format!("brt-{index}")),
        geo,
    }
}
