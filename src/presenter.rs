//! Turns evaluation results into what the map shows: the parcel layer, the
//! per-parcel popup text, the legend, and the summary panel.
//!
//! All formatting here is deterministic so the same result always renders
//! the same text. The layer swap is atomic and generation-checked: an older
//! result can never replace a newer one no matter the arrival order.

use std::collections::HashSet;

use crate::evaluator::{EvaluationResult, Summary};
use crate::log::debug;
use crate::policy::Density;

/// Fill colors per density class, darkest for the tallest rings.
#[must_use]
pub fn density_color(density: Density) -> &'static str {
    match density {
        Density::High => "#d73027",
        Density::Medium => "#fc8d59",
        Density::Low => "#fee08b",
    }
}

/// Groups digits: `1234567` -> `"1,234,567"`.
#[must_use]
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whole-dollar currency: `1234567.8` -> `"$1,234,568"`.
#[must_use]
pub fn format_currency(value: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = value.round().max(0.0) as u64;
    format!("${}", format_thousands(rounded))
}

fn prop_str<'a>(feature: &'a geojson::Feature, key: &str) -> Option<&'a str> {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(serde_json::Value::as_str)
}

fn prop_f64(feature: &geojson::Feature, key: &str) -> Option<f64> {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(serde_json::Value::as_f64)
}

fn prop_u64(feature: &geojson::Feature, key: &str) -> Option<u64> {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(serde_json::Value::as_u64)
}

/// Popup text for a classified parcel, one field per line. Missing fields
/// fall back to placeholders rather than being dropped, so popups always
/// have the same shape.
#[must_use]
pub fn popup_content(feature: &geojson::Feature) -> String {
    let address = prop_str(feature, "address").unwrap_or("No Address");
    let parcel_id = prop_str(feature, "parcel_id").unwrap_or("Unknown");
    let zone = prop_str(feature, "zone_district").unwrap_or("Unknown");
    let policy = prop_str(feature, "policy_source").unwrap_or("Unknown");
    let acres = prop_f64(feature, "land_area_acres").unwrap_or(0.0);
    let distance = prop_f64(feature, "distance_ft").unwrap_or(0.0);
    let ring = prop_u64(feature, "ring").unwrap_or(0);
    let height = prop_u64(feature, "assigned_height").unwrap_or(0);
    let assigned = prop_str(feature, "assigned_zone").unwrap_or("UNKNOWN");
    let units = prop_u64(feature, "potential_units").unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!("{address}\n"));
    out.push_str(&format!("Parcel: {parcel_id}\n"));
    out.push_str(&format!("Policy: {policy} (ring {ring}, {height} stories)\n"));
    out.push_str(&format!("Current Zoning: {zone}\n"));
    out.push_str(&format!("Assigned Zone: {assigned}\n"));
    out.push_str(&format!("Size: {acres:.2} acres\n"));
    out.push_str(&format!("Distance: {distance:.0} ft\n"));
    out.push_str(&format!("Potential: ~{} units", format_thousands(units)));
    out
}

/// One legend row: swatch color plus label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
    pub color: &'static str,
    pub label: String,
}

/// The fixed density legend, tallest first.
#[must_use]
pub fn legend() -> Vec<LegendEntry> {
    [
        (Density::High, "High density (8+ stories)"),
        (Density::Medium, "Medium density (5-7 stories)"),
        (Density::Low, "Low density (up to 4 stories)"),
    ]
    .into_iter()
    .map(|(density, label)| LegendEntry {
        color: density_color(density),
        label: label.to_string(),
    })
    .collect()
}

/// Summary panel text: the headline totals plus one line per policy, in the
/// summary's (sorted) key order.
#[must_use]
pub fn summary_text(summary: &Summary) -> String {
    let mut out = format!(
        "{} parcels · {} potential units",
        format_thousands(summary.total_parcels),
        format_thousands(summary.total_units)
    );
    for (name, totals) in &summary.by_policy {
        out.push_str(&format!(
            "\n{name}: {} parcels, {} units",
            format_thousands(totals.parcels),
            format_thousands(totals.units)
        ));
    }
    if summary.skipped_invalid > 0 {
        out.push_str(&format!(
            "\n{} parcels skipped (invalid geometry)",
            format_thousands(summary.skipped_invalid)
        ));
    }
    out
}

/// The currently displayed result, tagged with the request generation that
/// produced it.
pub struct ParcelLayer {
    pub generation: u64,
    pub result: EvaluationResult,
}

/// Owns the displayed layer and per-policy visibility. The previous layer
/// stays on screen until a newer result replaces it in one swap.
#[derive(Default)]
pub struct Presenter {
    layer: Option<ParcelLayer>,
    hidden_policies: HashSet<String>,
}

impl Presenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in `result` unless a layer from a newer generation is already
    /// displayed. Returns whether the swap happened.
    pub fn apply(&mut self, generation: u64, result: EvaluationResult) -> bool {
        if let Some(current) = &self.layer {
            if generation < current.generation {
                debug!(
                    "discarding stale layer (generation {generation} < {})",
                    current.generation
                );
                return false;
            }
        }
        self.layer = Some(ParcelLayer { generation, result });
        true
    }

    #[must_use]
    pub fn layer(&self) -> Option<&ParcelLayer> {
        self.layer.as_ref()
    }

    /// Hides or shows every parcel whose `policy_source` starts with the
    /// policy name. Takes effect immediately; no re-evaluation involved.
    pub fn set_policy_visible(&mut self, policy_name: &str, visible: bool) {
        if visible {
            self.hidden_policies.remove(policy_name);
        } else {
            self.hidden_policies.insert(policy_name.to_string());
        }
    }

    #[must_use]
    pub fn is_policy_visible(&self, policy_name: &str) -> bool {
        !self.hidden_policies.contains(policy_name)
    }

    /// The displayed features, skipping parcels of hidden policies.
    pub fn visible_features(&self) -> impl Iterator<Item = &geojson::Feature> {
        self.layer
            .iter()
            .flat_map(|layer| layer.result.geojson.features.iter())
            .filter(|feature| {
                prop_str(feature, "policy_source").is_none_or(|source| {
                    !self
                        .hidden_policies
                        .iter()
                        .any(|hidden| source.starts_with(hidden.as_str()))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::PolicyTotals;
    use std::collections::BTreeMap;

    fn feature(props: serde_json::Value) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: props.as_object().cloned(),
            foreign_members: None,
        }
    }

    fn result_with_sources(sources: &[&str]) -> EvaluationResult {
        let features = sources
            .iter()
            .map(|s| feature(serde_json::json!({"policy_source": s})))
            .collect();
        EvaluationResult {
            geojson: geojson::FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            },
            summary: Summary {
                total_parcels: sources.len() as u64,
                total_units: 0,
                by_policy: BTreeMap::new(),
                skipped_invalid: 0,
            },
        }
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn currency_rounds_to_whole_dollars() {
        assert_eq!(format_currency(0.0), "$0");
        assert_eq!(format_currency(1_234_567.8), "$1,234,568");
        assert_eq!(format_currency(-5.0), "$0");
    }

    #[test]
    fn popup_renders_all_fields() {
        let feature = feature(serde_json::json!({
            "parcel_id": "0123",
            "address": "123 Main St",
            "zone_district": "E-SU-DX",
            "policy_source": "TOD",
            "land_area_acres": 0.5,
            "distance_ft": 420.3,
            "ring": 1,
            "assigned_height": 8,
            "assigned_zone": "C-MX-8",
            "potential_units": 1280,
        }));
        let popup = popup_content(&feature);
        assert!(popup.starts_with("123 Main St\n"));
        assert!(popup.contains("Policy: TOD (ring 1, 8 stories)"));
        assert!(popup.contains("Size: 0.50 acres"));
        assert!(popup.contains("Distance: 420 ft"));
        assert!(popup.contains("~1,280 units"));
    }

    #[test]
    fn popup_uses_fallbacks_for_missing_fields() {
        let popup = popup_content(&feature(serde_json::json!({})));
        assert!(popup.starts_with("No Address\n"));
        assert!(popup.contains("Parcel: Unknown"));
        assert!(popup.contains("Current Zoning: Unknown"));
        assert!(popup.contains("~0 units"));
    }

    #[test]
    fn popup_is_deterministic() {
        let f = feature(serde_json::json!({"parcel_id": "x", "ring": 2}));
        assert_eq!(popup_content(&f), popup_content(&f));
    }

    #[test]
    fn legend_is_ordered_tallest_first() {
        let entries = legend();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].color, "#d73027");
        assert!(entries[0].label.contains("8+"));
        assert_eq!(entries[2].color, "#fee08b");
    }

    #[test]
    fn summary_panel_formats_totals() {
        let mut by_policy = BTreeMap::new();
        by_policy.insert(
            "TOD".to_string(),
            PolicyTotals {
                parcels: 1000,
                units: 40_000,
            },
        );
        let summary = Summary {
            total_parcels: 1234,
            total_units: 56_789,
            by_policy,
            skipped_invalid: 3,
        };
        let text = summary_text(&summary);
        assert!(text.starts_with("1,234 parcels · 56,789 potential units"));
        assert!(text.contains("TOD: 1,000 parcels, 40,000 units"));
        assert!(text.contains("3 parcels skipped"));
    }

    #[test]
    fn stale_generation_never_replaces_newer_layer() {
        let mut presenter = Presenter::new();
        assert!(presenter.apply(2, result_with_sources(&["TOD"])));
        assert!(!presenter.apply(1, result_with_sources(&["POD-Regional"])));
        let layer = presenter.layer().unwrap();
        assert_eq!(layer.generation, 2);
        assert_eq!(layer.result.geojson.features.len(), 1);
    }

    #[test]
    fn visibility_toggle_filters_features() {
        let mut presenter = Presenter::new();
        presenter.apply(1, result_with_sources(&["TOD", "POD-Regional", "BOD-Bus"]));
        assert_eq!(presenter.visible_features().count(), 3);

        presenter.set_policy_visible("POD", false);
        let visible: Vec<_> = presenter.visible_features().collect();
        assert_eq!(visible.len(), 2);
        assert!(!presenter.is_policy_visible("POD"));

        presenter.set_policy_visible("POD", true);
        assert_eq!(presenter.visible_features().count(), 3);
    }
}
