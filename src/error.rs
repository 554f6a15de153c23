use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `MilehighError` and maps other errors to
/// convert to a `MilehighError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum MilehighError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    GeoJsonError(geojson::Error),
    HttpError(reqwest::Error),
    ConfigError(String),
    MilehighError(String),
}

impl From<io::Error> for MilehighError {
    fn from(error: io::Error) -> Self {
        MilehighError::IoError(error)
    }
}

impl From<serde_json::Error> for MilehighError {
    fn from(error: serde_json::Error) -> Self {
        MilehighError::JsonError(error)
    }
}

impl From<csv::Error> for MilehighError {
    fn from(error: csv::Error) -> Self {
        MilehighError::CSVError(error)
    }
}

impl From<geojson::Error> for MilehighError {
    fn from(error: geojson::Error) -> Self {
        MilehighError::GeoJsonError(error)
    }
}

impl From<reqwest::Error> for MilehighError {
    fn from(error: reqwest::Error) -> Self {
        MilehighError::HttpError(error)
    }
}

impl From<String> for MilehighError {
    fn from(error: String) -> Self {
        MilehighError::MilehighError(error)
    }
}

impl From<&str> for MilehighError {
    fn from(error: &str) -> Self {
        MilehighError::MilehighError(error.to_string())
    }
}

impl std::error::Error for MilehighError {}

impl Display for MilehighError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}
