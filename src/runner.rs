//! Command-line entry point.
//!
//! Loads the parcel and feature data, then either runs one evaluation and
//! writes CSV reports, or serves the HTTP API until interrupted.

use clap::Parser;
use std::fs::File;
use std::path::PathBuf;

use crate::client::InProcessClient;
use crate::error::MilehighError;
use crate::evaluator::evaluate;
use crate::features::FeatureCatalog;
use crate::log::{enable_logging, info, set_log_level, LevelFilter};
use crate::parcel::ParcelSet;
use crate::policy::EvaluationConfig;
use crate::presenter::summary_text;
use crate::report::{write_parcel_report, write_summary_report};
use crate::server::serve_forever;

#[derive(Parser, Debug)]
#[command(version, about = "Parcel opportunity-zone evaluation")]
pub struct Args {
    /// Parcels GeoJSON file
    #[arg(short, long)]
    pub parcels: PathBuf,

    /// Directory with feature reference data (stations.geojson, parks.geojson, ...)
    #[arg(short, long)]
    pub features: PathBuf,

    /// Evaluation config JSON; omit for the ballot-measure preset
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory for CSV reports (one-shot mode)
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Serve the HTTP API on this port instead of evaluating once
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level
    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

fn load_config(path: Option<&PathBuf>) -> Result<EvaluationConfig, MilehighError> {
    let config = match path {
        Some(path) => serde_json::from_reader(File::open(path)?)?,
        None => EvaluationConfig::ballot_measure(),
    };
    config.validate()?;
    Ok(config)
}

pub fn run_with_args(args: &Args) -> Result<(), MilehighError> {
    enable_logging();
    set_log_level(args.log_level);

    let parcels = ParcelSet::from_path(&args.parcels)?;
    info!(
        "loaded {} parcels ({} skipped for invalid geometry)",
        parcels.len(),
        parcels.skipped_invalid
    );
    let catalog = FeatureCatalog::load_dir(&args.features)?;
    let config = load_config(args.config.as_ref())?;

    if let Some(port) = args.port {
        let client = InProcessClient::new(parcels, catalog);
        return serve_forever(&client, port);
    }

    let result = evaluate(&parcels, &catalog, &config)?;
    write_summary_report(args.output.join("summary.csv"), &result.summary)?;
    write_parcel_report(args.output.join("parcels.csv"), &result)?;
    println!("{}", summary_text(&result.summary));
    Ok(())
}

/// Parses arguments from the environment and runs.
pub fn run() -> Result<(), MilehighError> {
    run_with_args(&Args::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const PARCELS: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {
                "parcel_id": "p-1",
                "zone_district": "E-SU-DX",
                "land_area_acres": 0.5
            },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [0.0005, -0.0001], [0.0007, -0.0001],
                    [0.0007, 0.0001], [0.0005, 0.0001],
                    [0.0005, -0.0001]
                ]]
            }
        }]
    }"#;

    const STATIONS: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"STATION": "Union", "RAIL_LINE": "A"},
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
        }]
    }"#;

    fn args(parcels: PathBuf, features: PathBuf, output: PathBuf) -> Args {
        Args {
            parcels,
            features,
            config: None,
            output,
            port: None,
            log_level: LevelFilter::Off,
        }
    }

    #[test]
    fn parses_cli_arguments() {
        let args = Args::parse_from([
            "milehigh",
            "--parcels",
            "parcels.geojson",
            "--features",
            "data/",
            "--port",
            "3000",
        ]);
        assert_eq!(args.parcels, PathBuf::from("parcels.geojson"));
        assert_eq!(args.port, Some(3000));
        assert_eq!(args.log_level, LevelFilter::Info);
    }

    #[test]
    fn one_shot_run_writes_reports() {
        let dir = tempdir().unwrap();
        let parcels_path = dir.path().join("parcels.geojson");
        fs::write(&parcels_path, PARCELS).unwrap();
        let features_dir = dir.path().join("features");
        fs::create_dir(&features_dir).unwrap();
        fs::write(features_dir.join("stations.geojson"), STATIONS).unwrap();
        let output = dir.path().join("out");

        run_with_args(&args(parcels_path, features_dir, output.clone())).unwrap();
        assert!(output.join("summary.csv").exists());
        assert!(output.join("parcels.csv").exists());
    }

    #[test]
    fn missing_parcels_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = run_with_args(&args(
            dir.path().join("absent.geojson"),
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
        ));
        assert!(matches!(result, Err(MilehighError::IoError(_))));
    }

    #[test]
    fn bad_config_is_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            r#"{"exclude_unlikely": true, "tod": {"enabled": true, "rings": [{"distance": -5.0, "height": 8}]}}"#,
        )
        .unwrap();
        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(MilehighError::ConfigError(_))));
    }
}
