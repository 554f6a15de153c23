//! Zone-district code interpretation.
//!
//! Denver-style zone codes encode an allowed height in their suffix
//! (`C-MX-8` allows 8 stories). The evaluator uses this to apply the
//! upzone-only rule: a ring classification only counts when it is more
//! permissive than the parcel's current zoning.

/// Districts that never qualify for reclassification: campuses, historic,
/// airport, open space, planned developments, heavy industrial, and the
/// flex districts.
const EXCLUDED_PREFIXES: [&str; 6] = ["CMP", "H-", "CPV", "DIA", "OS-", "PUD"];
const EXCLUDED_EXACT: [&str; 4] = ["I-A", "I-B", "FX-1", "FX-2"];

/// Special current zones that receive `MX` instead of `RX` at the 5-story
/// ring, preserving main-street context.
const MID_RING_MX_CONTEXT: [&str; 7] = ["MX-2", "MX-2X", "MX-3", "MS-2", "MS-3", "CC-3", "CC-3X"];
/// Special current zones that receive `MX` instead of `MU` at the 3-story
/// ring.
const OUTER_RING_MX_CONTEXT: [&str; 3] = ["MX-2", "MX-2X", "MS-2"];

#[must_use]
pub fn is_excluded_district(zone_district: &str) -> bool {
    let zone = zone_district.trim().to_uppercase();
    if zone.is_empty() {
        return false;
    }
    EXCLUDED_PREFIXES.iter().any(|p| zone.starts_with(p))
        || EXCLUDED_EXACT.iter().any(|z| zone == *z)
}

/// Condominiums and common elements are ownership slivers, not
/// redevelopment candidates.
#[must_use]
pub fn is_excluded_property_class(property_class: &str) -> bool {
    let class = property_class.to_uppercase();
    class.contains("CONDOMINIUM") || class == "VACANT LAND /GENERAL COMMON ELEMENTS"
}

/// Maximum stories allowed under the parcel's current zone district.
///
/// Conservative fallbacks where the code carries no number: downtown is
/// treated as 20, industrial as 5, planned districts as 10, and everything
/// unrecognized as 2.5 stories.
#[must_use]
pub fn max_stories_from_zone(zone_district: &str) -> f64 {
    let zone = zone_district.trim().to_uppercase();
    if zone.is_empty() {
        return 0.0;
    }

    if zone.starts_with("D-") {
        return 20.0;
    }

    for tag in ["MX-", "RX-", "MS-", "MU-", "CC-"] {
        if let Some(stories) = suffix_number(&zone, tag) {
            return stories;
        }
    }

    if zone.contains("RH-") || zone.contains("TH-") {
        return suffix_number(&zone, "RH-")
            .or_else(|| suffix_number(&zone, "TH-"))
            .unwrap_or(2.5);
    }
    if zone.contains("TU-") || zone.starts_with("TU") {
        return suffix_number(&zone, "TU-").unwrap_or(2.5);
    }
    if zone.contains("SU-") || zone.starts_with("SU") {
        return 2.5;
    }
    if zone.starts_with("I-") {
        return 5.0;
    }
    if zone.starts_with("PUD") || zone.starts_with("GDP") {
        return 10.0;
    }

    2.5
}

/// Parses the numeric suffix following `tag`, e.g. `suffix_number("G-MU-3X",
/// "MU-")` is `Some(3.0)`. Tolerates a trailing context marker (`8x`) and a
/// half-story fraction (`2.5`).
fn suffix_number(zone: &str, tag: &str) -> Option<f64> {
    let start = zone.find(tag)? + tag.len();
    let rest = &zone[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    rest[..end].parse().ok()
}

/// The context prefix carried into an assigned zone, from the ballot
/// language: keep the first token of the current code, defaulting to `G`
/// (general urban).
fn zone_prefix(zone_district: &str) -> String {
    let zone = zone_district.trim().to_uppercase();
    let prefix = zone.split('-').next().unwrap_or("");
    if prefix.is_empty() {
        "G".to_string()
    } else {
        prefix.to_string()
    }
}

/// Derives the zone code a classified parcel would receive.
///
/// The 8/5/3-story rings follow the ballot language (context-prefixed
/// `MX-8` / `RX-5x` / `MU-3x`, with main-street exceptions); any other
/// height falls back to the ring's configured zone string.
#[must_use]
pub fn assigned_zone(current_zone: &str, height: u32, ring_zone: &str) -> String {
    let prefix = zone_prefix(current_zone);
    let current = current_zone.trim().to_uppercase();
    match height {
        8 => format!("{prefix}-MX-8"),
        5 => {
            if MID_RING_MX_CONTEXT.iter().any(|z| current.contains(z)) {
                format!("{prefix}-MX-5")
            } else {
                format!("{prefix}-RX-5x")
            }
        }
        3 => {
            if OUTER_RING_MX_CONTEXT.iter().any(|z| current.contains(z)) {
                format!("{prefix}-MX-3")
            } else {
                format!("{prefix}-MU-3x")
            }
        }
        _ if !ring_zone.is_empty() => ring_zone.to_string(),
        _ => "UNKNOWN".to_string(),
    }
}
