//! The policy evaluator: classifies parcels into rings for every enabled
//! policy and merges the per-policy results into a combined summary.
//!
//! This is the dominant cost of each evaluation. Feature lookups go through
//! an R-tree per feature class ([`crate::index::FeatureIndex`]); parcel
//! eligibility is computed once and shared across policies.

use geo::{Area, Point};
use rustc_hash::FxHashMap;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::density::potential_units;
use crate::error::MilehighError;
use crate::features::{FeatureCatalog, FeatureClass};
use crate::geometry::{polsby_popper, representative_point, LocalProjection};
use crate::index::FeatureIndex;
use crate::log::{debug, info};
use crate::parcel::{Parcel, ParcelSet};
use crate::policy::{assign_ring, sorted_rings, EvaluationConfig, PolicyKind, Ring};
use crate::zoning::{
    assigned_zone, is_excluded_district, is_excluded_property_class, max_stories_from_zone,
};

/// Parcels thinner than this Polsby-Popper score are treated as road or rail
/// slivers and never classified.
const MIN_COMPACTNESS: f64 = 0.3;

/// Construction after this year marks a parcel unlikely to redevelop.
const RECENT_CONSTRUCTION_YEAR: i64 = 2011;

/// Improvement-to-land value ratio at or above which redevelopment is
/// unlikely.
const MAX_IMPROVEMENT_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTotals {
    pub parcels: u64,
    pub units: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_parcels: u64,
    pub total_units: u64,
    /// Keyed by policy name; counts each parcel once, under its
    /// `policy_source`.
    pub by_policy: BTreeMap<String, PolicyTotals>,
    pub skipped_invalid: u64,
}

/// The full evaluation response: classified parcels as GeoJSON plus the
/// summary. This is the wire shape of the evaluation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub geojson: geojson::FeatureCollection,
    pub summary: Summary,
}

/// One parcel's winning assignment under a single policy.
#[derive(Debug, Clone)]
struct Assignment {
    policy: PolicyKind,
    /// `TOD`, `POD-Regional`, `POD-Community`, `BOD-BRT`, or `BOD-Bus`.
    source: &'static str,
    ring_number: usize,
    ring: Ring,
    distance_ft: f64,
}

/// Evaluates every enabled policy against the parcel set.
///
/// Within a policy a parcel gets the innermost satisfied ring; across
/// policies the combined view keeps the first enabled policy in the fixed
/// order TOD, POD, BOD as the parcel's `policy_source`. Output features are
/// in parcel input order, so identical inputs produce identical results.
pub fn evaluate(
    parcels: &ParcelSet,
    catalog: &FeatureCatalog,
    config: &EvaluationConfig,
) -> Result<EvaluationResult, MilehighError> {
    config.validate()?;

    let Some(projection) = LocalProjection::centered_on(
        parcels
            .parcels
            .iter()
            .filter_map(|p| representative_point(&p.geo).map(|pt| pt.0)),
    ) else {
        // No parcels at all: an empty but well-formed result.
        return Ok(empty_result(config, parcels.skipped_invalid));
    };

    // Projected measuring point and eligibility, once per parcel.
    let points: Vec<Option<Point<f64>>> = parcels
        .parcels
        .iter()
        .map(|parcel| {
            representative_point(&parcel.geo).map(|pt| Point::from(projection.project(pt.0)))
        })
        .collect();
    let eligible: Vec<bool> = parcels
        .parcels
        .iter()
        .map(|parcel| is_eligible(parcel, &projection, config.exclude_unlikely))
        .collect();

    let mut indexes: FxHashMap<FeatureClass, FeatureIndex> = FxHashMap::default();
    // parcel index -> per-policy winning assignment
    let mut by_policy_assignment: FxHashMap<usize, Vec<Assignment>> = FxHashMap::default();

    for policy in config.enabled_policies() {
        for (class, rings, source) in policy_measures(config, policy) {
            let index = indexes
                .entry(class)
                .or_insert_with(|| FeatureIndex::build(catalog.class_geometries(class, &projection)));
            if index.is_empty() {
                // An empty feature class yields zero matches, not an error.
                debug!("{source}: no features available, skipping measure");
                continue;
            }
            let rings = sorted_rings(&rings);
            for (i, parcel) in parcels.parcels.iter().enumerate() {
                if !eligible[i] {
                    continue;
                }
                let Some(point) = points[i].as_ref() else {
                    continue;
                };
                let Some(distance_ft) = index.nearest_distance_feet(point) else {
                    continue;
                };
                let Some((ring_index, ring)) = assign_ring(&rings, distance_ft) else {
                    continue;
                };
                // Upzone-only rule: the ring must allow more than current
                // zoning already does.
                if f64::from(ring.height) <= max_stories_from_zone(&parcel.zone_district) {
                    continue;
                }
                let assignment = Assignment {
                    policy,
                    source,
                    ring_number: ring_index + 1,
                    ring: ring.clone(),
                    distance_ft,
                };
                let slot = by_policy_assignment.entry(i).or_default();
                match slot.iter_mut().find(|a| a.policy == policy) {
                    // A policy with two feature classes (POD, BOD) keeps the
                    // innermost satisfied ring across both.
                    Some(existing) => {
                        if assignment.ring.distance < existing.ring.distance {
                            *existing = assignment;
                        }
                    }
                    None => slot.push(assignment),
                }
            }
        }
    }

    // Combined view: first-enabled-policy-wins, in input order.
    let precedence = config.enabled_policies();
    let mut features = Vec::new();
    let mut by_policy: BTreeMap<String, PolicyTotals> = precedence
        .iter()
        .map(|kind| {
            (
                kind.name().to_string(),
                PolicyTotals {
                    parcels: 0,
                    units: 0,
                },
            )
        })
        .collect();
    let mut total_units = 0u64;

    for (i, parcel) in parcels.parcels.iter().enumerate() {
        let Some(assignments) = by_policy_assignment.get(&i) else {
            continue;
        };
        let Some(assignment) = precedence
            .iter()
            .find_map(|kind| assignments.iter().find(|a| a.policy == *kind))
        else {
            continue;
        };

        let units = potential_units(parcel.land_area_acres, f64::from(assignment.ring.height));
        total_units += units;
        if let Some(totals) = by_policy.get_mut(assignment.policy.name()) {
            totals.parcels += 1;
            totals.units += units;
        }

        features.push(classified_feature(parcel, assignment, units));
    }

    let summary = Summary {
        total_parcels: features.len() as u64,
        total_units,
        by_policy,
        skipped_invalid: parcels.skipped_invalid as u64,
    };
    info!(
        "evaluated {} parcels: {} classified, {} potential units",
        parcels.len(),
        summary.total_parcels,
        summary.total_units
    );

    Ok(EvaluationResult {
        geojson: geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        summary,
    })
}

fn empty_result(config: &EvaluationConfig, skipped_invalid: usize) -> EvaluationResult {
    let by_policy = config
        .enabled_policies()
        .iter()
        .map(|kind| {
            (
                kind.name().to_string(),
                PolicyTotals {
                    parcels: 0,
                    units: 0,
                },
            )
        })
        .collect();
    EvaluationResult {
        geojson: geojson::FeatureCollection {
            bbox: None,
            features: Vec::new(),
            foreign_members: None,
        },
        summary: Summary {
            total_parcels: 0,
            total_units: 0,
            by_policy,
            skipped_invalid: skipped_invalid as u64,
        },
    }
}

/// The (feature class, rings, source tag) measures an enabled policy runs.
fn policy_measures(
    config: &EvaluationConfig,
    policy: PolicyKind,
) -> Vec<(FeatureClass, Vec<Ring>, &'static str)> {
    match policy {
        PolicyKind::Tod => config
            .tod
            .iter()
            .map(|p| (FeatureClass::LightRail, p.rings.clone(), "TOD"))
            .collect(),
        PolicyKind::Pod => config
            .pod
            .iter()
            .flat_map(|p| {
                [
                    (
                        FeatureClass::RegionalPark,
                        p.regional_parks.clone(),
                        "POD-Regional",
                    ),
                    (
                        FeatureClass::CommunityPark,
                        p.community_parks.clone(),
                        "POD-Community",
                    ),
                ]
            })
            .collect(),
        PolicyKind::Bod => config
            .bod
            .iter()
            .flat_map(|p| {
                let mut measures = Vec::new();
                if p.brt_enabled {
                    measures.push((FeatureClass::BrtLine, p.brt_rings.clone(), "BOD-BRT"));
                }
                if p.bus_enabled {
                    measures.push((FeatureClass::BusStop, p.bus_rings.clone(), "BOD-Bus"));
                }
                measures
            })
            .collect(),
    }
}

fn is_eligible(parcel: &Parcel, projection: &LocalProjection, exclude_unlikely: bool) -> bool {
    if parcel.land_area_acres <= 0.0 {
        return false;
    }
    if is_excluded_district(&parcel.zone_district) {
        return false;
    }
    if let Some(class) = &parcel.property_class {
        if is_excluded_property_class(class) {
            return false;
        }
    }
    // Thin-sliver filter, on the projected footprint. Assessor exports
    // deliver some parcels as multi-polygons; those are scored on their
    // largest member.
    let compactness = match projection.project_geometry(&parcel.geo) {
        geo::Geometry::Polygon(poly) => Some(polsby_popper(&poly)),
        geo::Geometry::MultiPolygon(multi) => multi
            .iter()
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(polsby_popper),
        _ => None,
    };
    if compactness.is_some_and(|score| score < MIN_COMPACTNESS) {
        return false;
    }

    if exclude_unlikely {
        if let Some(owner) = &parcel.owner_type {
            if owner == "school" || owner == "govt" {
                return false;
            }
        }
        if parcel.year_built.is_some_and(|y| y > RECENT_CONSTRUCTION_YEAR) {
            return false;
        }
        if let (Some(improvement), Some(land)) = (parcel.improvement_value, parcel.land_value) {
            if land > 0.0 && improvement / land >= MAX_IMPROVEMENT_RATIO {
                return false;
            }
        }
    }
    true
}

fn classified_feature(parcel: &Parcel, assignment: &Assignment, units: u64) -> geojson::Feature {
    let mut properties = serde_json::Map::new();
    let mut set = |key: &str, value: serde_json::Value| {
        properties.insert(key.to_string(), value);
    };
    set("parcel_id", parcel.parcel_id.clone().into());
    set(
        "address",
        parcel.address.clone().map_or(serde_json::Value::Null, Into::into),
    );
    set("zone_district", parcel.zone_district.clone().into());
    set("land_area_acres", parcel.land_area_acres.into());
    set(
        "distance_ft",
        ((assignment.distance_ft * 10.0).round() / 10.0).into(),
    );
    set("ring", assignment.ring_number.into());
    set("ring_density", assignment.ring.density().name().into());
    set("assigned_height", assignment.ring.height.into());
    set(
        "assigned_zone",
        assigned_zone(
            &parcel.zone_district,
            assignment.ring.height,
            &assignment.ring.zone,
        )
        .into(),
    );
    set("potential_units", units.into());
    set("policy_source", assignment.source.into());
    if let Some(opportunity) = &parcel.opportunity_type {
        set("opportunity_type", opportunity.clone().into());
    }

    geojson::Feature {
        bbox: None,
        geometry: Some(parcel.geometry.clone()),
        id: Some(geojson::feature::Id::String(parcel.parcel_id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}
