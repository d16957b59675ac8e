use hifitime::Epoch;
use thiserror::Error;

use crate::{constants::Degree, scan_geometry::FootprintId};

#[derive(Error, Debug)]
pub enum RotcolError {
    #[error("No orbital elements available for satellite {satellite} at {time}")]
    OrbitDataUnavailable { satellite: String, time: Epoch },

    #[error("Scan angle {scan_angle:.3}° is outside the instrument range (max {max_scan_angle:.3}°)")]
    GeometryOutOfRange {
        scan_angle: Degree,
        max_scan_angle: Degree,
    },

    #[error("Payload fetch failed for occultation {occid}: {reason}")]
    PayloadFetchFailed { occid: String, reason: String },

    #[error("Export to {path} failed: {reason}")]
    ExportFailed { path: String, reason: String },

    #[error("Invalid TLE: {0}")]
    InvalidTle(String),

    #[error("Orbit propagation failed for satellite {satellite}: {reason}")]
    PropagationFailed { satellite: String, reason: String },

    #[error("Kepler equation did not converge: {0}")]
    KeplerSolverFailed(#[from] roots::SearchError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid occultation query: {0}")]
    InvalidQuery(String),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Collocation ({occid}, {footprint}) is already present in the set")]
    DuplicateCollocation { occid: String, footprint: FootprintId },

    #[error("Collocation index {index} out of range (set size {size})")]
    CollocationIndexOutOfRange { index: usize, size: usize },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML configuration error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("CSV catalog error: {0}")]
    CsvError(#[from] csv::Error),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetcdfError(#[from] netcdf::Error),
}

impl PartialEq for RotcolError {
    fn eq(&self, other: &Self) -> bool {
        use RotcolError::*;
        match (self, other) {
            (
                OrbitDataUnavailable {
                    satellite: a,
                    time: ta,
                },
                OrbitDataUnavailable {
                    satellite: b,
                    time: tb,
                },
            ) => a == b && ta == tb,
            (
                GeometryOutOfRange {
                    scan_angle: a,
                    max_scan_angle: ma,
                },
                GeometryOutOfRange {
                    scan_angle: b,
                    max_scan_angle: mb,
                },
            ) => a == b && ma == mb,
            (
                PayloadFetchFailed { occid: a, reason: ra },
                PayloadFetchFailed { occid: b, reason: rb },
            ) => a == b && ra == rb,
            (ExportFailed { path: a, reason: ra }, ExportFailed { path: b, reason: rb }) => {
                a == b && ra == rb
            }
            (InvalidTle(a), InvalidTle(b)) => a == b,
            (
                PropagationFailed {
                    satellite: a,
                    reason: ra,
                },
                PropagationFailed {
                    satellite: b,
                    reason: rb,
                },
            ) => a == b && ra == rb,
            (KeplerSolverFailed(a), KeplerSolverFailed(b)) => a == b,
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (InvalidQuery(a), InvalidQuery(b)) => a == b,
            (InvalidTimeFormat(a), InvalidTimeFormat(b)) => a == b,
            (
                DuplicateCollocation {
                    occid: a,
                    footprint: fa,
                },
                DuplicateCollocation {
                    occid: b,
                    footprint: fb,
                },
            ) => a == b && fa == fb,
            (
                CollocationIndexOutOfRange { index: a, size: sa },
                CollocationIndexOutOfRange { index: b, size: sb },
            ) => a == b && sa == sb,

            // Wrapped library errors are not comparable: same variant means equal
            (IoError(_), IoError(_)) => true,
            (JsonError(_), JsonError(_)) => true,
            (YamlError(_), YamlError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            #[cfg(feature = "netcdf")]
            (NetcdfError(_), NetcdfError(_)) => true,

            _ => false,
        }
    }
}
