//! End-to-end tests over the GeoJSON fixtures in `tests/data`: a light-rail
//! station near two parcels, a regional park near one more, plus an
//! excluded open-space parcel, a distant parcel, and a feature with no
//! geometry.

use std::path::PathBuf;
use std::thread;

use milehigh::client::{EvaluateClient, HttpClient, InProcessClient};
use milehigh::evaluator::evaluate;
use milehigh::features::FeatureCatalog;
use milehigh::parcel::ParcelSet;
use milehigh::policy::{EvaluationConfig, PolicyKind};
use milehigh::report::{write_parcel_report, write_summary_report};
use milehigh::server::serve_and_report;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn load() -> (ParcelSet, FeatureCatalog) {
    let parcels = ParcelSet::from_path(data_dir().join("parcels.geojson")).unwrap();
    let catalog = FeatureCatalog::load_dir(data_dir().join("features")).unwrap();
    (parcels, catalog)
}

fn prop<'a>(feature: &'a geojson::Feature, key: &str) -> &'a serde_json::Value {
    feature.properties.as_ref().unwrap().get(key).unwrap()
}

fn feature_by_id<'a>(
    result: &'a milehigh::evaluator::EvaluationResult,
    id: &str,
) -> &'a geojson::Feature {
    result
        .geojson
        .features
        .iter()
        .find(|f| prop(f, "parcel_id").as_str() == Some(id))
        .unwrap_or_else(|| panic!("parcel {id} not classified"))
}

#[test]
fn ballot_measure_classifies_the_fixture_parcels() {
    let (parcels, catalog) = load();
    assert_eq!(parcels.len(), 5);
    assert_eq!(parcels.skipped_invalid, 1);

    let result = evaluate(&parcels, &catalog, &EvaluationConfig::ballot_measure()).unwrap();

    assert_eq!(result.summary.total_parcels, 3);
    assert_eq!(result.summary.total_units, 180);
    assert_eq!(result.summary.skipped_invalid, 1);
    assert_eq!(result.summary.by_policy["TOD"].parcels, 2);
    assert_eq!(result.summary.by_policy["TOD"].units, 130);
    assert_eq!(result.summary.by_policy["POD"].parcels, 1);
    assert_eq!(result.summary.by_policy["POD"].units, 50);
    assert_eq!(result.summary.by_policy["BOD"].parcels, 0);

    let near = feature_by_id(&result, "near-station");
    assert_eq!(prop(near, "ring"), 1);
    assert_eq!(prop(near, "assigned_height"), 8);
    assert_eq!(prop(near, "policy_source"), "TOD");
    assert_eq!(prop(near, "potential_units"), 80);
    let distance = prop(near, "distance_ft").as_f64().unwrap();
    assert!((distance - 420.0).abs() < 1.0, "distance was {distance}");

    let mid = feature_by_id(&result, "mid-station");
    assert_eq!(prop(mid, "ring"), 2);
    assert_eq!(prop(mid, "assigned_height"), 5);

    let park = feature_by_id(&result, "near-park");
    assert_eq!(prop(park, "policy_source"), "POD-Regional");
    assert_eq!(prop(park, "assigned_height"), 5);

    // Excluded district and out-of-range parcels never appear.
    assert!(!result.geojson.features.iter().any(|f| {
        let id = prop(f, "parcel_id").as_str();
        id == Some("open-space") || id == Some("far-away")
    }));
}

#[test]
fn output_order_matches_parcel_input_order() {
    let (parcels, catalog) = load();
    let result = evaluate(&parcels, &catalog, &EvaluationConfig::ballot_measure()).unwrap();
    let ids: Vec<&str> = result
        .geojson
        .features
        .iter()
        .map(|f| prop(f, "parcel_id").as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["near-station", "mid-station", "near-park"]);
}

#[test]
fn disabling_tod_drops_only_tod_parcels() {
    let (parcels, catalog) = load();
    let mut config = EvaluationConfig::ballot_measure();
    config.set_enabled(PolicyKind::Tod, false);
    let result = evaluate(&parcels, &catalog, &config).unwrap();

    assert_eq!(result.summary.total_parcels, 1);
    assert_eq!(result.summary.total_units, 50);
    assert!(!result.summary.by_policy.contains_key("TOD"));
    assert_eq!(result.summary.by_policy["POD"].parcels, 1);
}

#[test]
fn reports_round_trip_from_fixture_evaluation() {
    let (parcels, catalog) = load();
    let result = evaluate(&parcels, &catalog, &EvaluationConfig::ballot_measure()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("summary.csv");
    let parcels_path = dir.path().join("parcels.csv");
    write_summary_report(&summary_path, &result.summary).unwrap();
    write_parcel_report(&parcels_path, &result).unwrap();

    let mut reader = csv::Reader::from_path(&parcels_path).unwrap();
    assert_eq!(reader.records().count(), 3);
}

#[test]
fn http_boundary_matches_in_process_results() {
    let (parcels, catalog) = load();
    let in_process = InProcessClient::new(parcels, catalog);
    let expected = in_process
        .evaluate(&EvaluationConfig::ballot_measure())
        .unwrap();

    // Port 0 lets the OS pick; the ready channel reports the bound port.
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    thread::spawn(move || serve_and_report(&in_process, 0, &ready_tx));
    let port = ready_rx.recv().expect("server did not start");

    let client = HttpClient::new(&format!("http://127.0.0.1:{port}")).unwrap();
    let result = client.evaluate(&EvaluationConfig::ballot_measure()).unwrap();

    assert_eq!(result.summary, expected.summary);
    assert_eq!(result.geojson.features.len(), expected.geojson.features.len());
}
