//! CSV report output for one-shot evaluations.
//!
//! Two reports exist: a summary file with one row per policy plus a
//! combined row, and a per-parcel file with one row per classified parcel.
//! Paths must end in `.csv`; parent directories are created as needed.

use csv::Writer;
use serde_derive::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use crate::error::MilehighError;
use crate::evaluator::{EvaluationResult, Summary};
use crate::log::info;

/// One row of the summary report.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryRow {
    pub policy: String,
    pub parcels: u64,
    pub units: u64,
}

/// One row of the per-parcel report.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ParcelRow {
    pub parcel_id: String,
    pub address: String,
    pub zone_district: String,
    pub policy_source: String,
    pub ring: u64,
    pub assigned_height: u64,
    pub assigned_zone: String,
    pub land_area_acres: f64,
    pub distance_ft: f64,
    pub potential_units: u64,
}

// Checks that the path is valid. Creates the file and all parent directories
// if they do not exist. Returns the file if successful.
fn generate_validate_filepath(path: &Path) -> Result<File, MilehighError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    create_dir_all(parent)?;
                }
            }
            let file = File::create(path)?;
            Ok(file)
        }
        _ => Err(MilehighError::MilehighError(
            "report output files must be CSVs".to_string(),
        )),
    }
}

/// Writes the per-policy and combined totals to `path`.
pub fn write_summary_report<P: AsRef<Path>>(
    path: P,
    summary: &Summary,
) -> Result<(), MilehighError> {
    let path = path.as_ref();
    let file = generate_validate_filepath(path)?;
    let mut writer = Writer::from_writer(file);
    for (policy, totals) in &summary.by_policy {
        writer.serialize(SummaryRow {
            policy: policy.clone(),
            parcels: totals.parcels,
            units: totals.units,
        })?;
    }
    writer.serialize(SummaryRow {
        policy: "combined".to_string(),
        parcels: summary.total_parcels,
        units: summary.total_units,
    })?;
    writer.flush()?;
    info!("wrote summary report to {}", path.display());
    Ok(())
}

fn row_str(props: &serde_json::Map<String, serde_json::Value>, key: &str) -> String {
    props
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn row_u64(props: &serde_json::Map<String, serde_json::Value>, key: &str) -> u64 {
    props
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or_default()
}

fn row_f64(props: &serde_json::Map<String, serde_json::Value>, key: &str) -> f64 {
    props
        .get(key)
        .and_then(serde_json::Value::as_f64)
        .unwrap_or_default()
}

/// Writes one row per classified parcel, in the result's feature order.
pub fn write_parcel_report<P: AsRef<Path>>(
    path: P,
    result: &EvaluationResult,
) -> Result<(), MilehighError> {
    let path = path.as_ref();
    let file = generate_validate_filepath(path)?;
    let mut writer = Writer::from_writer(file);
    for feature in &result.geojson.features {
        let Some(props) = feature.properties.as_ref() else {
            continue;
        };
        writer.serialize(ParcelRow {
            parcel_id: row_str(props, "parcel_id"),
            address: row_str(props, "address"),
            zone_district: row_str(props, "zone_district"),
            policy_source: row_str(props, "policy_source"),
            ring: row_u64(props, "ring"),
            assigned_height: row_u64(props, "assigned_height"),
            assigned_zone: row_str(props, "assigned_zone"),
            land_area_acres: row_f64(props, "land_area_acres"),
            distance_ft: row_f64(props, "distance_ft"),
            potential_units: row_u64(props, "potential_units"),
        })?;
    }
    writer.flush()?;
    info!(
        "wrote {} parcel rows to {}",
        result.geojson.features.len(),
        path.display()
    );
    Ok(())
}
