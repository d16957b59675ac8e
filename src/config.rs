//! Session and matching configuration.
//!
//! A [`RotcolConfig`] is an explicit value handed to the components that need it; the
//! crate keeps no process-wide defaults. It deserializes from YAML:
//!
//! ```yaml
//! session:
//!   data_root: /data/rotcol
//!   metadata_root: /data/rotcol/metadata
//!   eumetsat:
//!     username: me
//!     password: secret
//! matching:
//!   time_tolerance: 600.0
//!   spatial_tolerance: 150000.0
//!   sub_occultations: 2
//! ```
//!
//! Every matching field has a default, so a configuration may omit the `matching`
//! section entirely.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    collocation::Tolerances,
    constants::{Meter, Second},
    rotcol_errors::RotcolError,
};

/// Credentials for one data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where data lives and how to reach the external archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Root directory of downloaded instrument data and TLE files.
    pub data_root: PathBuf,
    /// Root directory of the RO metadata snapshots.
    pub metadata_root: PathBuf,
    /// EUMETSAT Data Store (Metop AMSU-A / MHS Level 1B).
    #[serde(default)]
    pub eumetsat: Option<Credentials>,
    /// NASA Earthdata (JPSS ATMS Level 1B).
    #[serde(default)]
    pub earthdata: Option<Credentials>,
    /// Space-Track (two-line elements).
    #[serde(default)]
    pub spacetrack: Option<Credentials>,
}

impl SessionConfig {
    pub fn new(data_root: impl AsRef<Path>, metadata_root: impl AsRef<Path>) -> Self {
        SessionConfig {
            data_root: data_root.as_ref().to_path_buf(),
            metadata_root: metadata_root.as_ref().to_path_buf(),
            eumetsat: None,
            earthdata: None,
            spacetrack: None,
        }
    }

    /// Directory holding the `{satellite}.tle` files.
    pub fn tle_directory(&self) -> PathBuf {
        self.data_root.join("tle")
    }
}

fn default_time_tolerance() -> Second {
    600.0
}

fn default_spatial_tolerance() -> Meter {
    150_000.0
}

fn default_sub_occultations() -> usize {
    2
}

fn default_margin_scans() -> u32 {
    1
}

fn default_parallel() -> bool {
    true
}

/// Parameters of a collocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Maximum |Δt| between an occultation and a footprint, in seconds.
    #[serde(default = "default_time_tolerance")]
    pub time_tolerance: Second,
    /// Maximum great-circle distance, in meters.
    #[serde(default = "default_spatial_tolerance")]
    pub spatial_tolerance: Meter,
    /// Requested number of sub-occultations of the rotation matcher.
    #[serde(default = "default_sub_occultations")]
    pub sub_occultations: usize,
    /// Extra scan lines generated on each side of a time interval.
    #[serde(default = "default_margin_scans")]
    pub margin_scans: u32,
    /// Spread matching over the rayon thread pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            time_tolerance: default_time_tolerance(),
            spatial_tolerance: default_spatial_tolerance(),
            sub_occultations: default_sub_occultations(),
            margin_scans: default_margin_scans(),
            parallel: default_parallel(),
        }
    }
}

impl MatchConfig {
    pub fn tolerances(&self) -> Tolerances {
        Tolerances::new(self.time_tolerance, self.spatial_tolerance)
    }

    pub fn validate(&self) -> Result<(), RotcolError> {
        self.tolerances().validate()?;
        if self.sub_occultations == 0 {
            return Err(RotcolError::InvalidConfiguration(
                "sub_occultations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration of a collocation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotcolConfig {
    pub session: SessionConfig,
    #[serde(default)]
    pub matching: MatchConfig,
}

impl RotcolConfig {
    pub fn new(session: SessionConfig) -> Self {
        RotcolConfig {
            session,
            matching: MatchConfig::default(),
        }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RotcolError> {
        let config: RotcolConfig = serde_yaml::from_str(yaml)?;
        config.matching.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RotcolError> {
        let text = std::fs::read_to_string(path)?;
        RotcolConfig::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> Result<String, RotcolError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn test_defaults_when_matching_omitted() {
        let config = RotcolConfig::from_yaml_str(
            "session:\n  data_root: /tmp/data\n  metadata_root: /tmp/meta\n",
        )
        .unwrap();
        assert_eq!(config.matching, MatchConfig::default());
        assert_eq!(config.matching.time_tolerance, 600.0);
        assert_eq!(config.matching.spatial_tolerance, 150e3);
        assert!(config.session.eumetsat.is_none());
        assert_eq!(config.session.tle_directory(), PathBuf::from("/tmp/data/tle"));
    }

    #[test]
    fn test_full_document() {
        let yaml = "
session:
  data_root: /data
  metadata_root: /meta
  spacetrack:
    username: someone
    password: hunter2
matching:
  time_tolerance: 2700
  spatial_tolerance: 50000
  sub_occultations: 3
  parallel: false
";
        let config = RotcolConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.matching.time_tolerance, 2700.0);
        assert_eq!(config.matching.sub_occultations, 3);
        assert_eq!(config.matching.margin_scans, 1);
        assert!(!config.matching.parallel);
        assert_eq!(
            config.session.spacetrack.as_ref().map(|c| c.username.as_str()),
            Some("someone")
        );

        let again = RotcolConfig::from_yaml_str(&config.to_yaml_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_invalid_matching() {
        let yaml = "
session: {data_root: /d, metadata_root: /m}
matching: {spatial_tolerance: -1.0}
";
        assert!(matches!(
            RotcolConfig::from_yaml_str(yaml),
            Err(RotcolError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RotcolConfig::from_yaml_str("session: 12"),
            Err(RotcolError::YamlError(_))
        ));
    }
}
